//! Camera frames and the single-slot hand-off between producer and pipeline.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::PipelineError;

/// A packed RGB8 image.
///
/// Pixel data is shared, so cloning a frame is cheap.
#[derive(Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    rgb: Arc<[u8]>,
    seq: u64,
}

impl Frame {
    /// Wraps `rgb`, which must hold exactly `width * height * 3` bytes.
    pub fn new(width: u32, height: u32, rgb: impl Into<Arc<[u8]>>) -> Result<Self, PipelineError> {
        let rgb = rgb.into();
        let want = width as usize * height as usize * 3;
        if width == 0 || height == 0 || rgb.len() != want {
            return Err(PipelineError::InvalidFrame(format!(
                "{width}x{height} RGB needs {want} bytes, got {}",
                rgb.len()
            )));
        }
        Ok(Self {
            width,
            height,
            rgb,
            seq: 0,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgb(&self) -> &[u8] {
        &self.rgb
    }

    /// Sequence number assigned by [`FrameChannel::set`]; 0 for frames that
    /// never went through a channel.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("seq", &self.seq)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Single-slot, latest-wins frame buffer.
///
/// [`FrameChannel::set`] always succeeds immediately, replacing a frame that
/// has not been taken yet. [`FrameChannel::take_latest`] empties the slot,
/// so a frame is handed out at most once. The lock is only held for a swap,
/// so the producer never waits on the consumer's work.
///
/// Clones share the same slot.
#[derive(Clone)]
pub struct FrameChannel {
    inner: Arc<FrameChannelInner>,
}

struct FrameChannelInner {
    slot: Mutex<Option<Frame>>,
    next_seq: AtomicU64,
    dropped: AtomicU64,
}

impl FrameChannel {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FrameChannelInner {
                slot: Mutex::new(None),
                next_seq: AtomicU64::new(1),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Publishes `frame` and returns the sequence number it was given.
    /// Sequence numbers start at 1 and increase with every call.
    pub fn set(&self, mut frame: Frame) -> u64 {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        frame.seq = seq;
        let replaced = {
            let mut slot = self.inner.slot.lock();
            // Sequence numbers are handed out before the lock; keep the newer
            // frame if two producers race.
            match slot.as_ref() {
                Some(current) if current.seq > seq => Some(frame),
                _ => slot.replace(frame),
            }
        };
        if replaced.is_some() {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
        }
        seq
    }

    /// Takes the pending frame, leaving the slot empty.
    pub fn take_latest(&self) -> Option<Frame> {
        self.inner.slot.lock().take()
    }

    /// Returns true if a frame is waiting.
    pub fn has_pending(&self) -> bool {
        self.inner.slot.lock().is_some()
    }

    /// Number of frames replaced before anyone took them.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

impl Default for FrameChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn frame(w: u32, h: u32) -> Frame {
        Frame::new(w, h, vec![0u8; (w * h * 3) as usize]).unwrap()
    }

    #[test]
    fn frame_size_is_checked() {
        assert!(Frame::new(2, 2, vec![0u8; 12]).is_ok());
        assert!(matches!(
            Frame::new(2, 2, vec![0u8; 11]),
            Err(PipelineError::InvalidFrame(_))
        ));
        assert!(Frame::new(0, 2, Vec::<u8>::new()).is_err());
    }

    #[test]
    fn latest_wins() {
        let ch = FrameChannel::new();
        assert!(ch.take_latest().is_none());

        let s1 = ch.set(frame(1, 1));
        let s2 = ch.set(frame(2, 2));
        assert!(s2 > s1);
        assert!(ch.has_pending());

        let f = ch.take_latest().unwrap();
        assert_eq!(f.seq(), s2);
        assert_eq!(f.width(), 2);
        assert_eq!(ch.dropped(), 1);

        // Taking clears the slot.
        assert!(ch.take_latest().is_none());
        assert!(!ch.has_pending());
    }

    #[test]
    fn clones_share_slot() {
        let producer = FrameChannel::new();
        let consumer = producer.clone();
        producer.set(frame(1, 1));
        assert!(consumer.take_latest().is_some());
        assert!(producer.take_latest().is_none());
    }

    #[test]
    fn concurrent_producers_keep_newest() {
        let ch = FrameChannel::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ch = ch.clone();
                thread::spawn(move || {
                    let mut last = 0;
                    for _ in 0..1000 {
                        last = ch.set(frame(1, 1));
                    }
                    last
                })
            })
            .collect();
        let max = handles.into_iter().map(|h| h.join().unwrap()).max().unwrap();

        let f = ch.take_latest().unwrap();
        assert_eq!(f.seq(), max);
        assert_eq!(ch.dropped(), 3999);
    }

    #[test]
    fn is_send_sync_clone() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<FrameChannel>();
        assert_send_sync::<Frame>();
    }
}
