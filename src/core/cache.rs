//! 帧解码结果缓存
//!
//! An append-only, tab-delimited record of per-frame decodes. A later scan
//! over the same video can replay it instead of running recognition. Rows
//! are consumed strictly in order and every row is checked against the
//! frame it is supposed to describe; the first disagreement turns replay
//! off for the rest of the run.

use log::{info, warn};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One memoized frame decode.
///
/// `template_code` is the short template code, or `!` for a frame that
/// could not be decoded at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub frame_index: u64,
    pub template_code: String,
    pub number: Option<u32>,
    pub total: Option<u32>,
    pub countdown: Option<u32>,
}

impl CacheEntry {
    pub const UNDECODABLE_CODE: &'static str = "!";

    pub fn to_row(&self) -> String {
        let field = |v: Option<u32>| v.map(|n| n.to_string()).unwrap_or_default();
        format!(
            "{}\t{}\t{}\t{}\t{}",
            self.frame_index,
            self.template_code,
            field(self.number),
            field(self.total),
            field(self.countdown)
        )
    }

    pub fn parse_row(line: &str) -> Option<Self> {
        let mut fields = line.trim_end_matches(['\r', '\n']).split('\t');
        let optional = |s: Option<&str>| -> Option<Option<u32>> {
            match s? {
                "" => Some(None),
                v => v.parse().ok().map(Some),
            }
        };

        let frame_index = fields.next()?.parse().ok()?;
        let template_code = fields.next().filter(|c| !c.is_empty())?.to_string();
        let number = optional(fields.next())?;
        let total = optional(fields.next())?;
        let countdown = optional(fields.next())?;
        if fields.next().is_some() {
            return None;
        }

        Some(Self {
            frame_index,
            template_code,
            number,
            total,
            countdown,
        })
    }
}

/// 顺序读取缓存行
pub struct CacheSource {
    reader: Box<dyn BufRead + Send>,
    active: bool,
    replayed: u64,
}

impl CacheSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let file = File::open(path.as_ref())?;
        info!("📂 Replaying frame cache from {}", path.as_ref().display());
        Ok(Self::from_reader(BufReader::new(file)))
    }

    pub fn from_reader<R: BufRead + Send + 'static>(reader: R) -> Self {
        Self {
            reader: Box::new(reader),
            active: true,
            replayed: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn replayed(&self) -> u64 {
        self.replayed
    }

    /// The next row, if it describes `frame_index`.
    ///
    /// End of file, an unreadable row or an index mismatch all disable the
    /// source for good.
    pub fn next_for(&mut self, frame_index: u64) -> Option<CacheEntry> {
        if !self.active {
            return None;
        }

        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => {
                info!(
                    "📂 Frame cache exhausted after {} rows, decoding live from frame {}",
                    self.replayed, frame_index
                );
                self.active = false;
                return None;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("⚠️ Frame cache read failed: {}, decoding live", e);
                self.active = false;
                return None;
            }
        }

        match CacheEntry::parse_row(&line) {
            Some(entry) if entry.frame_index == frame_index => {
                self.replayed += 1;
                Some(entry)
            }
            Some(entry) => {
                warn!(
                    "⚠️ Frame cache desync: expected frame {}, found {}. Decoding live for the rest of the run",
                    frame_index, entry.frame_index
                );
                self.active = false;
                None
            }
            None => {
                warn!(
                    "⚠️ Malformed frame cache row {:?} at frame {}. Decoding live for the rest of the run",
                    line.trim_end(),
                    frame_index
                );
                self.active = false;
                None
            }
        }
    }

    /// Stop replaying after a row that parsed but cannot be trusted.
    pub fn abandon(&mut self, frame_index: u64, reason: &str) {
        if !self.active {
            return;
        }
        warn!(
            "⚠️ Unusable frame cache row at frame {}: {}. Decoding live for the rest of the run",
            frame_index, reason
        );
        self.active = false;
    }
}

/// 追加写入缓存行
pub struct CacheSink {
    writer: BufWriter<Box<dyn Write + Send>>,
    active: bool,
}

impl CacheSink {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        info!("📝 Recording frame cache to {}", path.as_ref().display());
        Ok(Self::from_writer(file))
    }

    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            writer: BufWriter::new(Box::new(writer)),
            active: true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn record(&mut self, entry: &CacheEntry) {
        if !self.active {
            return;
        }
        if let Err(e) = writeln!(self.writer, "{}", entry.to_row()) {
            warn!("⚠️ Frame cache write failed: {}, recording disabled", e);
            self.active = false;
        }
    }

    pub fn flush(&mut self) {
        if !self.active {
            return;
        }
        if let Err(e) = self.writer.flush() {
            warn!("⚠️ Frame cache flush failed: {}, recording disabled", e);
            self.active = false;
        }
    }
}

impl Drop for CacheSink {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Optional source and sink used together by the moment reader.
#[derive(Default)]
pub struct ReplayCache {
    source: Option<CacheSource>,
    sink: Option<CacheSink>,
}

impl ReplayCache {
    /// A cache that neither replays nor records.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: CacheSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_sink(mut self, sink: CacheSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn is_replaying(&self) -> bool {
        self.source.as_ref().is_some_and(|s| s.is_active())
    }

    pub fn replay(&mut self, frame_index: u64) -> Option<CacheEntry> {
        self.source.as_mut()?.next_for(frame_index)
    }

    pub fn abandon_replay(&mut self, frame_index: u64, reason: &str) {
        if let Some(source) = self.source.as_mut() {
            source.abandon(frame_index, reason);
        }
    }

    pub fn record(&mut self, entry: &CacheEntry) {
        if let Some(sink) = self.sink.as_mut() {
            sink.record(entry);
        }
    }

    pub fn flush(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            sink.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn entry(frame_index: u64, code: &str, number: Option<u32>, countdown: Option<u32>) -> CacheEntry {
        CacheEntry {
            frame_index,
            template_code: code.to_string(),
            number,
            total: None,
            countdown,
        }
    }

    #[test]
    fn test_row_format() {
        let e = CacheEntry {
            frame_index: 42,
            template_code: "Q".to_string(),
            number: Some(5),
            total: Some(78),
            countdown: Some(150),
        };
        assert_eq!(e.to_row(), "42\tQ\t5\t78\t150");
        assert_eq!(CacheEntry::parse_row("42\tQ\t5\t78\t150\n"), Some(e));

        let blank = entry(7, "-", None, None);
        assert_eq!(blank.to_row(), "7\t-\t\t\t");
        assert_eq!(CacheEntry::parse_row("7\t-\t\t\t"), Some(blank));
    }

    #[test]
    fn test_malformed_rows() {
        assert_eq!(CacheEntry::parse_row(""), None);
        assert_eq!(CacheEntry::parse_row("x\tQ\t1\t\t"), None);
        assert_eq!(CacheEntry::parse_row("1\tQ\t1"), None);
        assert_eq!(CacheEntry::parse_row("1\t\t\t\t"), None);
        assert_eq!(CacheEntry::parse_row("1\tQ\tabc\t\t"), None);
        assert_eq!(CacheEntry::parse_row("1\tQ\t\t\t\t9"), None);
    }

    #[test]
    fn test_source_replays_in_order() {
        let rows = "3\tF\t1\t\t12\n4\tF\t1\t\t12\n";
        let mut source = CacheSource::from_reader(Cursor::new(rows.to_string()));

        assert_eq!(source.next_for(3), Some(entry(3, "F", Some(1), Some(12))));
        assert_eq!(source.next_for(4), Some(entry(4, "F", Some(1), Some(12))));
        assert!(source.is_active());
        assert_eq!(source.next_for(5), None);
        assert!(!source.is_active());
        assert_eq!(source.replayed(), 2);
    }

    #[test]
    fn test_source_desync_disables_for_good() {
        let rows = "3\tF\t1\t\t12\n9\tF\t1\t\t12\n5\tF\t1\t\t12\n";
        let mut source = CacheSource::from_reader(Cursor::new(rows.to_string()));

        assert!(source.next_for(3).is_some());
        assert_eq!(source.next_for(4), None);
        assert!(!source.is_active());
        assert_eq!(source.next_for(5), None);
    }

    #[test]
    fn test_abandoned_source_stays_off() {
        let rows = "3\tF\t\t\t12\n4\tF\t1\t\t12\n";
        let mut cache =
            ReplayCache::disabled().with_source(CacheSource::from_reader(Cursor::new(rows.to_string())));

        assert!(cache.replay(3).is_some());
        cache.abandon_replay(3, "bad slots");
        assert!(!cache.is_replaying());
        assert_eq!(cache.replay(4), None);
    }

    #[test]
    fn test_sink_appends_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.cache");

        {
            let mut sink = CacheSink::open(&path).unwrap();
            sink.record(&entry(0, "-", None, None));
        }
        {
            let mut sink = CacheSink::open(&path).unwrap();
            sink.record(&entry(1, "!", None, None));
        }

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "0\t-\t\t\t\n1\t!\t\t\t\n");

        let mut source = CacheSource::open(&path).unwrap();
        assert_eq!(source.next_for(0), Some(entry(0, "-", None, None)));
        assert_eq!(source.next_for(1), Some(entry(1, "!", None, None)));
    }

    #[test]
    fn test_missing_source_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            CacheSource::open(dir.path().join("absent.cache")),
            Err(CacheError::Io(_))
        ));
    }

    #[test]
    fn test_disabled_cache_is_inert() {
        let mut cache = ReplayCache::disabled();
        assert!(!cache.is_replaying());
        assert_eq!(cache.replay(0), None);
        cache.record(&entry(0, "-", None, None));
        cache.flush();
    }
}
