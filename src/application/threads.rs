/// Bytes above which the connection count is capped at the maximum.
const SIZE_CAP: u64 = 16_000_000;

/// Connections used when nothing better is known.
const DEFAULT_THREADS: u32 = 16;

/// Maps the caller's override and the known file size to an effective
/// connection count.
///
/// An explicit override wins verbatim when positive; a zero override falls
/// through to the size-based rule. Pure and total: no I/O, no side effects.
pub fn effective_thread_count(max_threads: Option<u32>, known_size: Option<u64>) -> u32 {
    if let Some(threads) = max_threads {
        if threads > 0 {
            return threads;
        }
    }

    match known_size {
        Some(size) if size > 0 => {
            if size >= SIZE_CAP {
                DEFAULT_THREADS
            } else {
                // roughly one connection per megabyte, never less than one
                ((size / 1_000_000) as u32).max(1)
            }
        }
        _ => DEFAULT_THREADS,
    }
}
