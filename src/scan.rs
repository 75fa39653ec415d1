//! The parallel scan: one dispatcher feeding chunk offsets through a bounded
//! queue to a fixed pool of workers, all writing into one presence bitmap.

use std::panic;
use std::thread;

use crossbeam_channel::Receiver;
use log::{debug, warn};

use crate::bitmap::PresenceBitmap;
use crate::chunk::{owned_range, ChunkPlan};
use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::parse::{Line, LineParser};
use crate::source::ChunkSource;

/// Counters gathered by the workers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Chunk jobs that produced at least one byte.
    pub chunks: u64,
    /// Bytes in the ranges the chunks owned. Equals the input length unless a
    /// line longer than the padding spans several chunks; the part of it past
    /// its owner's window belongs to no chunk and is not counted.
    pub bytes: u64,
    pub valid_lines: u64,
    pub invalid_lines: u64,
}

impl ScanStats {
    fn merge(&mut self, other: ScanStats) {
        self.chunks += other.chunks;
        self.bytes += other.bytes;
        self.valid_lines += other.valid_lines;
        self.invalid_lines += other.invalid_lines;
    }
}

/// Result of a complete scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanSummary {
    /// Number of distinct valid addresses.
    pub unique: u64,
    pub stats: ScanStats,
}

/// Counts the distinct IPv4 addresses in `source`, one per line.
pub fn count_unique<S>(source: &S, config: &ScanConfig) -> Result<ScanSummary, ScanError>
where
    S: ChunkSource + ?Sized,
{
    config.validate()?;
    let bitmap = PresenceBitmap::new();
    let stats = scan_into(source, &bitmap, config)?;
    // every worker has been joined, nothing writes to the bitmap any more
    let unique = bitmap.count();
    Ok(ScanSummary { unique, stats })
}

/// Scans `source` into `bitmap` and returns once every worker has exited.
///
/// The dispatcher runs on the calling thread. It blocks whenever the job queue
/// is full, and closes the queue after the last offset so that workers drain
/// it and stop.
pub fn scan_into<S>(
    source: &S,
    bitmap: &PresenceBitmap,
    config: &ScanConfig,
) -> Result<ScanStats, ScanError>
where
    S: ChunkSource + ?Sized,
{
    config.validate()?;
    let (jobs_tx, jobs_rx) = crossbeam_channel::bounded::<u64>(config.queue_capacity());

    let results = thread::scope(|s| {
        let handles = (0..config.workers.get())
            .map(|_| {
                let jobs = jobs_rx.clone();
                s.spawn(move || run_worker(source, jobs, bitmap, config))
            })
            .collect::<Vec<_>>();
        drop(jobs_rx);

        for offset in ChunkPlan::new(source.len(), config.chunk_size) {
            if jobs_tx.send(offset).is_err() {
                // every worker has already bailed out with an error
                break;
            }
        }
        drop(jobs_tx);

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|p| panic::resume_unwind(p)))
            .collect::<Vec<_>>()
    }); // scope ends, all workers were joined

    let mut stats = ScanStats::default();
    for result in results {
        stats.merge(result?);
    }
    Ok(stats)
}

/// Pulls offsets until the queue is closed and drained.
fn run_worker<S>(
    source: &S,
    jobs: Receiver<u64>,
    bitmap: &PresenceBitmap,
    config: &ScanConfig,
) -> Result<ScanStats, ScanError>
where
    S: ChunkSource + ?Sized,
{
    let window_len = config.window_len();
    let mut scratch = if source.borrows_windows() {
        Vec::new()
    } else {
        vec![0u8; window_len]
    };
    let mut stats = ScanStats::default();

    for offset in jobs.iter() {
        let window = source
            .window(offset, window_len, &mut scratch)
            .map_err(|e| ScanError::Read { offset, source: e })?;
        if window.is_empty() {
            warn!(
                "read at offset {offset} returned no bytes, input shorter than its {} byte length",
                source.len()
            );
            continue;
        }
        let at_eof = offset + window.len() as u64 >= source.len();
        scan_chunk(window, offset, config.chunk_size, at_eof, bitmap, &mut stats);
    }
    Ok(stats)
}

/// Parses the lines the chunk at `offset` owns and records them in `bitmap`.
fn scan_chunk(
    window: &[u8],
    offset: u64,
    chunk_size: usize,
    at_eof: bool,
    bitmap: &PresenceBitmap,
    stats: &mut ScanStats,
) {
    let range = owned_range(window, offset, chunk_size);
    debug!(
        "chunk at {offset}: owns bytes {}..{} of {}",
        range.start,
        range.end,
        window.len()
    );
    let reaches_window_end = range.end == window.len();
    let base = offset + range.start as u64;
    let owned = &window[range];

    let mut valid_lines = 0;
    let mut invalid_lines = 0;
    let mut on_line = |line: Line| match line {
        Line::Address(address) => {
            bitmap.set(address);
            valid_lines += 1;
        }
        Line::Invalid { start } => {
            invalid_lines += 1;
            warn!("invalid IPv4 address on line at byte {}", base + start as u64);
        }
    };

    let mut parser = LineParser::new();
    parser.push(owned, &mut on_line);
    if reaches_window_end {
        if at_eof {
            parser.finish(&mut on_line);
        } else {
            // longer than the padding, so longer than any valid line
            parser.discard(&mut on_line);
        }
    }

    stats.chunks += 1;
    stats.bytes += owned.len() as u64;
    stats.valid_lines += valid_lines;
    stats.invalid_lines += invalid_lines;
}

#[cfg(test)]
mod test {
    use std::io;
    use std::net::Ipv4Addr;
    use std::num::NonZeroUsize;

    use fake::faker::internet::raw::IPv4;
    use fake::locales::EN;
    use fake::Fake;
    use rustc_hash::FxHashSet;

    use super::{count_unique, scan_into};
    use crate::bitmap::PresenceBitmap;
    use crate::config::ScanConfig;
    use crate::error::ScanError;
    use crate::source::ChunkSource;

    /// In-memory input whose reads fail from `fail_from` onwards.
    struct FailingSource {
        data: Vec<u8>,
        fail_from: u64,
    }

    impl ChunkSource for FailingSource {
        fn len(&self) -> u64 {
            self.data.len() as u64
        }

        fn borrows_windows(&self) -> bool {
            true
        }

        fn window<'a>(
            &'a self,
            offset: u64,
            len: usize,
            scratch: &'a mut [u8],
        ) -> io::Result<&'a [u8]> {
            if offset >= self.fail_from {
                return Err(io::Error::other("device went away"));
            }
            self.data[..].window(offset, len, scratch)
        }
    }

    /// In-memory input that reports more bytes than it can deliver, like a
    /// file truncated after it was stat-ed.
    struct ShrunkSource {
        data: Vec<u8>,
        claimed_len: u64,
    }

    impl ChunkSource for ShrunkSource {
        fn len(&self) -> u64 {
            self.claimed_len
        }

        fn borrows_windows(&self) -> bool {
            true
        }

        fn window<'a>(
            &'a self,
            offset: u64,
            len: usize,
            scratch: &'a mut [u8],
        ) -> io::Result<&'a [u8]> {
            self.data[..].window(offset, len, scratch)
        }
    }

    fn config(chunk_size: usize, workers: usize) -> ScanConfig {
        ScanConfig {
            chunk_size,
            padding: 20,
            workers: NonZeroUsize::new(workers).unwrap(),
            queue_depth: 2,
        }
    }

    fn unique(input: &str, config: &ScanConfig) -> u64 {
        match count_unique(input.as_bytes(), config) {
            Ok(summary) => summary.unique,
            Err(e) => panic!("scan failed on `{}`: {e}", input.escape_debug()),
        }
    }

    #[test]
    fn scenarios() {
        for (input, expected) in [
            ("1.1.1.1\n1.1.1.1\n2.2.2.2\n", 2),
            ("1.1.1.1\n256.1.1.1\n1.1.1.1\n", 1),
            ("", 0),
            ("\n\n\n", 0),
            ("1.2.3\n1.2.3.4.5\nabc\n", 0),
            ("0.0.0.0\n255.255.255.255\n", 2),
            // final line without a trailing newline still counts
            ("1.1.1.1\n2.2.2.2", 2),
            ("9.9.9.9", 1),
            ("1.1.1.1\n2.2.2.2\r\n", 1),
        ] {
            for chunk_size in [1, 8, 4096] {
                assert_eq!(
                    unique(input, &config(chunk_size, 2)),
                    expected,
                    "input: `{}`, chunk size {chunk_size}",
                    input.escape_debug()
                );
            }
        }
    }

    #[test]
    fn extremes_land_on_their_own_bits() {
        let bitmap = PresenceBitmap::new();
        let stats = scan_into(
            &b"255.255.255.255\n0.0.0.0\n"[..],
            &bitmap,
            &config(4, 3),
        )
        .unwrap();
        assert!(bitmap.contains(0));
        assert!(bitmap.contains(u32::MAX));
        assert!(!bitmap.contains(1));
        assert_eq!(bitmap.count(), 2);
        assert_eq!(stats.valid_lines, 2);
        assert_eq!(stats.invalid_lines, 0);
        assert_eq!(stats.bytes, 24);
    }

    #[test]
    fn invalid_config_is_rejected_before_scanning() {
        let mut broken = config(64, 1);
        broken.padding = 8;
        match count_unique(&b"1.1.1.1\n"[..], &broken) {
            Err(ScanError::InvalidConfig { .. }) => {}
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn overlong_lines_are_invalid_once_each() {
        let junk = "7".repeat(50);
        let input = format!("1.1.1.1\n{junk}\n2.2.2.2\n{junk}");
        for chunk_size in [1, 2, 5, 8, 13, 64] {
            let summary = count_unique(input.as_bytes(), &config(chunk_size, 3)).unwrap();
            assert_eq!(summary.unique, 2, "chunk size {chunk_size}");
            assert_eq!(
                summary.stats.invalid_lines, 2,
                "chunk size {chunk_size}"
            );
            assert_eq!(summary.stats.valid_lines, 2, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn result_independent_of_chunking_and_workers() {
        let mut expected = FxHashSet::default();
        let mut input = String::new();
        let mut valid_lines = 0;
        for i in 0..2000 {
            let address: String = IPv4(EN).fake();
            let parsed: Ipv4Addr = address.parse().unwrap();
            expected.insert(u32::from(parsed));
            input.push_str(&address);
            input.push('\n');
            valid_lines += 1;
            if i % 7 == 0 {
                // duplicate, likely in another chunk
                input.push_str(&address);
                input.push('\n');
                valid_lines += 1;
            }
            if i % 13 == 0 {
                input.push_str("300.1.2.3\n");
            }
            if i % 17 == 0 {
                input.push_str("10.0.0\n");
            }
        }
        let invalid_lines = (0..2000).filter(|i| i % 13 == 0).count() as u64
            + (0..2000).filter(|i| i % 17 == 0).count() as u64;

        for chunk_size in [1, 3, 7, 61, 4096, 1 << 20] {
            for workers in [1, 4] {
                let summary = count_unique(input.as_bytes(), &config(chunk_size, workers)).unwrap();
                assert_eq!(
                    summary.unique,
                    expected.len() as u64,
                    "chunk size {chunk_size}, workers {workers}"
                );
                assert_eq!(summary.stats.valid_lines, valid_lines);
                assert_eq!(summary.stats.invalid_lines, invalid_lines);
                assert_eq!(summary.stats.bytes, input.len() as u64);
            }
        }
    }

    #[test]
    fn read_error_fails_the_scan() {
        let data = "1.1.1.1\n".repeat(50).into_bytes();
        let source = FailingSource {
            data,
            fail_from: 200,
        };
        for workers in [1, 4] {
            let mut config = config(16, workers);
            config.queue_depth = 1;
            match count_unique(&source, &config) {
                Err(ScanError::Read { offset, .. }) => {
                    assert!(offset >= 200, "offset {offset}, workers {workers}");
                    assert_eq!(offset % 16, 0, "offset {offset}, workers {workers}");
                }
                other => panic!("expected read error with {workers} workers, got {other:?}"),
            }
        }
    }

    #[test]
    fn empty_read_before_end_is_skipped() {
        let source = ShrunkSource {
            data: b"1.1.1.1\n2.2.2.2\n".to_vec(),
            claimed_len: 64,
        };
        for workers in [1, 3] {
            let summary = count_unique(&source, &config(8, workers)).unwrap();
            assert_eq!(summary.unique, 2, "workers {workers}");
            assert_eq!(summary.stats.valid_lines, 2);
            assert_eq!(summary.stats.invalid_lines, 0);
            // offsets 16..64 read nothing and are not counted as chunks
            assert_eq!(summary.stats.chunks, 2);
            assert_eq!(summary.stats.bytes, 16);
        }
    }

    #[test]
    fn overlong_line_tail_is_owned_by_no_chunk() {
        let input = "65.3.94.200\n63.1.199.145\n12.62020.214.3.268.133\n9103.1.132.87\n";
        for chunk_size in [1, 3, 8, 4096] {
            let summary = count_unique(input.as_bytes(), &config(chunk_size, 2)).unwrap();
            assert_eq!(summary.unique, 2, "chunk size {chunk_size}");
            assert_eq!(summary.stats.valid_lines, 2, "chunk size {chunk_size}");
            assert_eq!(summary.stats.invalid_lines, 2, "chunk size {chunk_size}");
            assert!(
                summary.stats.bytes <= input.len() as u64,
                "chunk size {chunk_size}: {} bytes",
                summary.stats.bytes
            );
        }
        // with the whole input in one window nothing is skipped
        let summary = count_unique(input.as_bytes(), &config(4096, 1)).unwrap();
        assert_eq!(summary.stats.bytes, input.len() as u64);
    }
}
