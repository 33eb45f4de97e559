//! Per-upload state machine buffering an image under a byte budget.
//!
//! ```text
//! Uninitialized --announce--> Accumulating --chunk*--> Accumulating --complete--> Done
//!                  \                  \                                  \
//!                   `-----------------`----------------------------------`--> Aborted
//! ```
//!
//! Every error moves the accumulator to `Aborted` and releases the buffer.
//! Nothing is valid after `Done` or `Aborted`.

use std::mem;

use uuid::Uuid;

use crate::config::UploadLimits;
use crate::error::{Result, Stage, UploadError};
use crate::image::{self, PixelArray};
use crate::upload::{Claim, FileInfo, UploadHandler};

#[derive(Debug, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
enum State {
    Uninitialized,
    Accumulating {
        budget: u64,
        declared: u64,
        buffer: Vec<u8>,
    },
    Done {
        received: u64,
    },
    Aborted {
        received: u64,
    },
}

#[derive(Debug)]
pub struct UploadAccumulator {
    id: Uuid,
    limits: UploadLimits,
    state: State,
}

impl UploadAccumulator {
    pub fn new(limits: UploadLimits) -> Self {
        Self {
            id: Uuid::new_v4(),
            limits,
            state: State::Uninitialized,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state_name(&self) -> &'static str {
        (&self.state).into()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, State::Done { .. } | State::Aborted { .. })
    }

    /// Bytes accepted so far. Once terminal, the count at the time the buffer
    /// was released.
    pub fn received_length(&self) -> u64 {
        match &self.state {
            State::Uninitialized => 0,
            State::Accumulating { buffer, .. } => buffer.len() as u64,
            State::Done { received } | State::Aborted { received } => *received,
        }
    }

    /// Validates the announced metadata and claims the upload stream.
    pub fn announce(&mut self, content_type: &str, declared_length: u64) -> Result<Claim> {
        if !matches!(self.state, State::Uninitialized) {
            return Err(self.out_of_sequence("announce"));
        }

        if content_type.is_empty() {
            return Err(self.abort(UploadError::InvalidMetadata("content type not set")));
        }
        if declared_length == 0 {
            return Err(self.abort(UploadError::InvalidMetadata("content length not set")));
        }

        let budget = match self.limits.budget() {
            Ok(budget) => budget,
            Err(e) => return Err(self.abort(e)),
        };

        if declared_length > budget {
            return Err(self.abort(UploadError::BudgetExceeded {
                stage: Stage::Announce,
                length: declared_length,
                limit: budget,
            }));
        }

        log::debug!(
            "[{}] accepted {content_type} upload of {declared_length} bytes (budget {budget})",
            self.id
        );

        self.state = State::Accumulating {
            budget,
            declared: declared_length,
            buffer: Vec::with_capacity(declared_length as usize),
        };
        Ok(Claim::Exclusive)
    }

    /// Appends the next chunk. A chunk that would break a limit is never
    /// partially appended.
    pub fn chunk(&mut self, bytes: &[u8], offset: u64) -> Result<()> {
        let strict = self.limits.strict_declared_length;

        let State::Accumulating {
            budget,
            declared,
            buffer,
        } = &mut self.state
        else {
            return Err(self.out_of_sequence("chunk"));
        };

        let new_length = buffer.len() as u64 + bytes.len() as u64;

        let violation = if new_length > *budget {
            Some((Stage::Chunk, *budget))
        } else if strict && new_length > *declared {
            Some((Stage::DeclaredLength, *declared))
        } else {
            None
        };

        if let Some((stage, limit)) = violation {
            return Err(self.abort(UploadError::BudgetExceeded {
                stage,
                length: new_length,
                limit,
            }));
        }

        // Never reserve past the budget, even when the sender under-declared.
        let needed = new_length as usize;
        if needed > buffer.capacity() {
            let target = (buffer.capacity() * 2).max(needed).min(*budget as usize);
            buffer.reserve_exact(target - buffer.len());
        }
        buffer.extend_from_slice(bytes);
        log::trace!(
            "[{}] chunk of {} bytes at offset {offset}, {new_length} buffered",
            self.id,
            bytes.len()
        );
        Ok(())
    }

    /// Checks the final size and decodes the buffered image. Terminal.
    pub fn complete(&mut self, reported_size: u64) -> Result<PixelArray> {
        let received = self.received_length();
        let buffer = match mem::replace(&mut self.state, State::Aborted { received }) {
            State::Accumulating { buffer, .. } => buffer,
            other => {
                self.state = other;
                return Err(self.out_of_sequence("complete"));
            }
        };

        if received != reported_size {
            return Err(self.abort(UploadError::BudgetExceeded {
                stage: Stage::Complete,
                length: reported_size,
                limit: received,
            }));
        }

        let decoded = image::decode(&buffer).map_err(|e| self.abort(e))?;
        drop(buffer);

        let pixels = PixelArray::from(decoded);
        log::debug!(
            "[{}] decoded {}x{}x{} image from {received} bytes",
            self.id,
            pixels.height(),
            pixels.width(),
            pixels.channels()
        );

        self.state = State::Done { received };
        Ok(pixels)
    }

    fn out_of_sequence(&mut self, operation: &'static str) -> UploadError {
        let err = UploadError::OutOfSequence {
            operation,
            state: self.state_name(),
        };
        self.abort(err)
    }

    fn abort(&mut self, err: UploadError) -> UploadError {
        log::warn!("[{}] upload aborted: {err}", self.id);
        self.release();
        err
    }

    /// Moves to `Aborted`, dropping any buffered bytes. `Done` stays `Done`.
    fn release(&mut self) {
        if !matches!(self.state, State::Done { .. }) {
            let received = self.received_length();
            self.state = State::Aborted { received };
        }
    }
}

impl UploadHandler for UploadAccumulator {
    type Output = PixelArray;

    fn new_file(&mut self, info: &FileInfo) -> Result<Claim> {
        self.announce(&info.content_type, info.content_length)
    }

    fn receive_chunk(&mut self, chunk: &[u8], offset: u64) -> Result<()> {
        self.chunk(chunk, offset)
    }

    fn file_complete(&mut self, file_size: u64) -> Result<PixelArray> {
        self.complete(file_size)
    }

    fn upload_interrupted(&mut self) {
        if !self.is_terminal() {
            log::warn!(
                "[{}] upload interrupted after {} bytes",
                self.id,
                self.received_length()
            );
        }
        self.release();
    }
}
