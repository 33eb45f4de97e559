//! Feeds an [`UploadHandler`] from a byte stream, the way a multipart parser
//! would once it has found a file part.

use std::io::{ErrorKind, Read};
use std::num::NonZeroUsize;

use crate::error::{Result, UploadError};
use crate::upload::{Claim, FileInfo, UploadHandler};

/// Streams `reader` through `handler` in chunks of at most `chunk_size` bytes.
///
/// Returns `Ok(None)` when the handler passes on the file. The size reported
/// to [`UploadHandler::file_complete`] is the number of bytes read, not the
/// announced length. A read failure is reported to the handler through
/// [`UploadHandler::upload_interrupted`] before it is returned.
pub fn stream_upload<H, R>(
    handler: &mut H,
    info: &FileInfo,
    mut reader: R,
    chunk_size: NonZeroUsize,
) -> Result<Option<H::Output>>
where
    H: UploadHandler + ?Sized,
    R: Read,
{
    if handler.new_file(info)? == Claim::Pass {
        log::debug!("Handler passed on `{}`", info.file_name);
        return Ok(None);
    }

    let mut chunk = vec![0u8; chunk_size.get()];
    let mut offset = 0u64;

    loop {
        let filled = match read_chunk(&mut reader, &mut chunk) {
            Ok(filled) => filled,
            Err(e) => {
                log::warn!("Upload of `{}` interrupted after {offset} bytes", info.file_name);
                handler.upload_interrupted();
                return Err(e);
            }
        };
        if filled == 0 {
            break;
        }

        handler.receive_chunk(&chunk[..filled], offset)?;
        offset += filled as u64;

        if filled < chunk.len() {
            break;
        }
    }

    log::debug!("Read {offset} bytes for `{}`", info.file_name);
    handler.file_complete(offset).map(Some)
}

/// Fills `buf` as far as the reader allows. Short only at end of stream.
fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(UploadError::Io(e)),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::UploadAccumulator;
    use crate::config::UploadLimits;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    /// Records every call it receives.
    #[derive(Default)]
    struct Recorder {
        claim: Option<Claim>,
        chunks: Vec<(Vec<u8>, u64)>,
        completed: Option<u64>,
        interrupted: bool,
    }

    impl UploadHandler for Recorder {
        type Output = usize;

        fn new_file(&mut self, _info: &FileInfo) -> Result<Claim> {
            Ok(self.claim.unwrap_or(Claim::Exclusive))
        }

        fn receive_chunk(&mut self, chunk: &[u8], offset: u64) -> Result<()> {
            self.chunks.push((chunk.to_vec(), offset));
            Ok(())
        }

        fn file_complete(&mut self, file_size: u64) -> Result<usize> {
            self.completed = Some(file_size);
            Ok(self.chunks.len())
        }

        fn upload_interrupted(&mut self) {
            self.interrupted = true;
        }
    }

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    /// Hands out at most three bytes per read.
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let len = buf.len().min(3);
            self.0.read(&mut buf[..len])
        }
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::ConnectionReset, "peer went away"))
        }
    }

    /// Serves its bytes, then fails like a dropped connection.
    struct CutOff(Cursor<Vec<u8>>);

    impl Read for CutOff {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.0.read(buf)? {
                0 => Err(std::io::Error::new(ErrorKind::ConnectionReset, "gone")),
                n => Ok(n),
            }
        }
    }

    #[test]
    fn chunks_carry_offsets_and_total() {
        let mut handler = Recorder::default();
        let info = FileInfo::new("image/png", 10);

        let out = stream_upload(&mut handler, &info, Cursor::new(b"0123456789"), size(4)).unwrap();

        assert_eq!(out, Some(3));
        assert_eq!(
            handler.chunks,
            vec![
                (b"0123".to_vec(), 0),
                (b"4567".to_vec(), 4),
                (b"89".to_vec(), 8),
            ]
        );
        assert_eq!(handler.completed, Some(10));
    }

    #[test]
    fn short_reads_are_coalesced() {
        let mut handler = Recorder::default();
        let info = FileInfo::new("image/png", 8);
        let reader = Trickle(Cursor::new(b"abcdefgh".to_vec()));

        stream_upload(&mut handler, &info, reader, size(8)).unwrap();

        assert_eq!(handler.chunks, vec![(b"abcdefgh".to_vec(), 0)]);
    }

    #[test]
    fn empty_stream_completes_with_zero() {
        let mut handler = Recorder::default();
        let info = FileInfo::new("image/png", 1);

        stream_upload(&mut handler, &info, Cursor::new(Vec::new()), size(4)).unwrap();

        assert!(handler.chunks.is_empty());
        assert_eq!(handler.completed, Some(0));
    }

    #[test]
    fn passing_handler_reads_nothing() {
        let mut handler = Recorder {
            claim: Some(Claim::Pass),
            ..Recorder::default()
        };
        let info = FileInfo::new("text/plain", 4);

        let out = stream_upload(&mut handler, &info, Broken, size(4)).unwrap();

        assert_eq!(out, None);
        assert_eq!(handler.completed, None);
    }

    #[test]
    fn read_failures_reset_the_connection() {
        let mut handler = Recorder::default();
        let info = FileInfo::new("image/png", 4);

        let err = stream_upload(&mut handler, &info, Broken, size(4)).unwrap_err();

        assert!(matches!(err, UploadError::Io(_)));
        assert!(err.resets_connection());
        assert!(handler.interrupted);
    }

    #[test]
    fn broken_stream_interrupts_the_handler_mid_upload() {
        let mut handler = Recorder::default();
        let info = FileInfo::new("image/png", 16);
        let reader = CutOff(Cursor::new(b"01234567".to_vec()));

        let err = stream_upload(&mut handler, &info, reader, size(4)).unwrap_err();

        assert!(matches!(err, UploadError::Io(_)));
        assert_eq!(handler.chunks.len(), 2);
        assert!(handler.interrupted);
        assert_eq!(handler.completed, None);
    }

    #[test]
    fn broken_stream_aborts_the_accumulator() {
        let mut acc = UploadAccumulator::new(UploadLimits::with_max_bytes(64));
        let info = FileInfo::new("image/png", 16);
        let reader = CutOff(Cursor::new(b"01234567".to_vec()));

        let err = stream_upload(&mut acc, &info, reader, size(4)).unwrap_err();

        assert!(matches!(err, UploadError::Io(_)));
        assert!(acc.is_terminal());
        assert_eq!(acc.state_name(), "aborted");
        assert_eq!(acc.received_length(), 8);
    }
}
