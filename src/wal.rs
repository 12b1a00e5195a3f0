use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// No single event comes near this; a bigger length prefix is garbage.
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Write one `[len][bincode][crc32]` frame.
fn write_frame(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "event too large for WAL frame"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Why reading stopped before a full frame was decoded.
enum FrameEnd {
    /// End of file, or a frame cut off by a crash mid-write.
    Torn,
    /// Checksum or payload didn't decode.
    Corrupt,
}

/// `Ok(false)` when the file ends first.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn read_frame(reader: &mut impl Read) -> io::Result<Result<Event, FrameEnd>> {
    let mut len_buf = [0u8; 4];
    if !fill(reader, &mut len_buf)? {
        return Ok(Err(FrameEnd::Torn));
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Ok(Err(FrameEnd::Corrupt));
    }
    let mut payload = vec![0u8; len];
    if !fill(reader, &mut payload)? {
        return Ok(Err(FrameEnd::Torn));
    }
    let mut crc_buf = [0u8; 4];
    if !fill(reader, &mut crc_buf)? {
        return Ok(Err(FrameEnd::Torn));
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(Err(FrameEnd::Corrupt));
    }
    Ok(bincode::deserialize::<Event>(&payload).map_err(|_| FrameEnd::Corrupt))
}

/// Append-only log of every reservation-set change.
///
/// Frame layout: `[u32 LE: payload len][bincode Event][u32 LE: crc32 of payload]`.
/// A torn or corrupt tail ends replay; everything before it is kept.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Append and fsync one event. Tests only; the engine batches through
    /// `append_buffered` + `flush_sync`.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer an event. Not durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        write_frame(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn compact_tmp_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Phase one of compaction: write `events` to a synced temp file beside the WAL.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::compact_tmp_path(path))?);
        for event in events {
            write_frame(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Phase two: rename the temp file over the WAL and reopen for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(Self::compact_tmp_path(&self.path), &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Read back every intact event. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        loop {
            match read_frame(&mut reader)? {
                Ok(event) => events.push(event),
                Err(FrameEnd::Torn) => break,
                Err(FrameEnd::Corrupt) => {
                    tracing::warn!(
                        path = %path.display(),
                        recovered = events.len(),
                        "corrupt WAL frame, discarding the rest of the log"
                    );
                    break;
                }
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DateRange, Reservation, ReservationStatus};
    use chrono::Utc;
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("stayline_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn registered(id: Ulid) -> Event {
        Event::ListingRegistered {
            id,
            owner_id: Ulid::new(),
            nightly_rate: 15_000,
            max_guests: 4,
        }
    }

    fn admitted(listing_id: Ulid) -> Event {
        Event::ReservationAdmitted {
            reservation: Reservation {
                id: Ulid::new(),
                listing_id,
                guest_id: Ulid::new(),
                range: DateRange::parse("2024-06-10", "2024-06-15").unwrap(),
                status: ReservationStatus::Pending,
                total_price: 75_000,
                created_at: Utc::now(),
            },
        }
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let lid = Ulid::new();
        let events = vec![registered(lid), admitted(lid)];
        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
        }
        assert_eq!(Wal::replay(&path).unwrap(), events);
    }

    #[test]
    fn replay_missing_file_is_empty() {
        let path = tmp_path("missing.wal");
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn replay_drops_torn_tail() {
        let path = tmp_path("torn.wal");
        let event = registered(Ulid::new());
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&event).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[0u8; 6]).unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![event]);
    }

    #[test]
    fn replay_stops_at_bad_checksum() {
        let path = tmp_path("bad_crc.wal");
        let good = registered(Ulid::new());
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&good).unwrap();
        }
        {
            let payload = bincode::serialize(&Event::ListingRemoved { id: Ulid::new() }).unwrap();
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEAD_BEEFu32.to_le_bytes()).unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![good]);
    }

    #[test]
    fn compact_shrinks_and_accepts_appends() {
        let path = tmp_path("compact.wal");
        let lid = Ulid::new();
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&registered(lid)).unwrap();
            for _ in 0..20 {
                wal.append(&Event::ListingUpdated {
                    id: lid,
                    nightly_rate: 10_000,
                    max_guests: 2,
                })
                .unwrap();
            }
        }
        let before = fs::metadata(&path).unwrap().len();

        let compacted = vec![registered(lid)];
        let after_event = admitted(lid);
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.compact(&compacted).unwrap();
            assert_eq!(wal.appends_since_compact(), 0);
            wal.append(&after_event).unwrap();
        }
        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted WAL should be smaller: {after} < {before}");

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed, vec![compacted[0].clone(), after_event]);
    }

    #[test]
    fn buffered_appends_count_until_flushed() {
        let path = tmp_path("buffered.wal");
        let events: Vec<Event> = (0..5).map(|_| registered(Ulid::new())).collect();
        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append_buffered(e).unwrap();
            }
            assert_eq!(wal.appends_since_compact(), 5);
            wal.flush_sync().unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), events);
    }
}
