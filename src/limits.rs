/// Longest single stay.
pub const MAX_STAY_NIGHTS: u32 = 365;
/// How far ahead a check-in may be, counted from today.
pub const MAX_BOOKING_HORIZON_DAYS: u64 = 730;
/// Reservations retained per listing, cancelled ones included.
pub const MAX_RESERVATIONS_PER_LISTING: usize = 50_000;
pub const MAX_LISTINGS: usize = 1_000_000;
/// Longest city or country name.
pub const MAX_LOCATION_LEN: usize = 128;
/// Listings considered by a single search call.
pub const MAX_SEARCH_CANDIDATES: usize = 5_000;
/// Widest calendar window for blocked-day and free-range queries.
pub const MAX_CALENDAR_WINDOW_DAYS: u32 = 3_660;
