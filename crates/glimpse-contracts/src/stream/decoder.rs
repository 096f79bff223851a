use tracing::debug;

use super::frame::{decode_line, DecoderConfig, LineOutcome};

/// Lazily turns a line source into answer fragments, in arrival order.
///
/// Malformed frames are counted and skipped. An error from the line source is
/// passed through once and the stream is finished afterwards.
pub struct FragmentStream<I> {
    lines: I,
    config: DecoderConfig,
    skipped: usize,
    finished: bool,
}

impl<I> FragmentStream<I> {
    pub fn new(lines: I, config: DecoderConfig) -> Self {
        Self {
            lines,
            config,
            skipped: 0,
            finished: false,
        }
    }

    /// Number of malformed frames dropped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<I, L, E> Iterator for FragmentStream<I>
where
    I: Iterator<Item = Result<L, E>>,
    L: AsRef<str>,
{
    type Item = Result<String, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(err)) => {
                    self.finished = true;
                    return Some(Err(err));
                }
                None => {
                    self.finished = true;
                    return None;
                }
            };
            match decode_line(line.as_ref()) {
                LineOutcome::Blank | LineOutcome::Ignored => {}
                LineOutcome::Malformed(err) => {
                    self.skipped += 1;
                    debug!(skipped = self.skipped, "skipping frame: {err}");
                }
                LineOutcome::Frame(frame) => {
                    if let Some(fragment) = self.config.fragment_of(frame) {
                        return Some(Ok(fragment));
                    }
                }
            }
        }
    }
}
