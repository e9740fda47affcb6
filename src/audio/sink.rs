//! Lock-free sample buffer between the network thread and the audio clock.
//!
//! The network side pushes decoded f32 samples; the audio output callback
//! drains them in real time and pads with silence on underrun. Two atomic
//! counters (samples pushed vs. samples rendered) let the render side detect
//! the moment playback genuinely catches up with delivery, which is the only
//! reliable "done speaking" signal for a streaming synthesizer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam_queue::ArrayQueue;
use tokio::sync::mpsc;
use tracing::warn;

/// Decodes little-endian signed 16-bit PCM into normalized f32 samples.
///
/// A trailing odd byte (a split sample across websocket frames should not
/// happen, but a truncated frame can) is ignored.
pub fn decode_pcm16le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// Shared sample buffer with playback-completion detection.
///
/// `render` is called from the audio device callback and never blocks or
/// allocates. All other methods are called from async tasks.
pub struct SampleSink {
    buffer: ArrayQueue<f32>,
    pushed: AtomicU64,
    rendered: AtomicU64,
    awaiting: AtomicBool,
    completion_tx: mpsc::Sender<()>,
}

impl SampleSink {
    /// Creates a sink holding at most `capacity` samples, plus the receiver
    /// on which completion signals are delivered.
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<()>) {
        let (completion_tx, completion_rx) = mpsc::channel(16);
        let sink = Arc::new(Self {
            buffer: ArrayQueue::new(capacity),
            pushed: AtomicU64::new(0),
            rendered: AtomicU64::new(0),
            awaiting: AtomicBool::new(false),
            completion_tx,
        });
        (sink, completion_rx)
    }

    /// Appends decoded samples. Samples that do not fit are dropped; the
    /// pushed counter settles on the count of samples that actually entered
    /// the buffer, so completion detection stays consistent under overflow.
    pub fn push(&self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        // advance the counter before any sample becomes poppable: the
        // render side must never observe rendered > pushed, and must not
        // see the batch as complete while it is still being inserted
        self.pushed.fetch_add(samples.len() as u64, Ordering::AcqRel);
        self.awaiting.store(true, Ordering::Release);

        let mut accepted: u64 = 0;
        for &sample in samples {
            if self.buffer.push(sample).is_err() {
                break;
            }
            accepted += 1;
        }
        let dropped = samples.len() as u64 - accepted;
        if dropped > 0 {
            self.pushed.fetch_sub(dropped, Ordering::AcqRel);
            warn!(dropped, "sample buffer full, dropping audio");
        }
    }

    /// Fills an output block from the buffer, padding with silence when the
    /// network is behind. Runs on the audio device thread.
    pub fn render(&self, out: &mut [f32]) {
        let mut drained: u64 = 0;
        for slot in out.iter_mut() {
            match self.buffer.pop() {
                Some(sample) => {
                    *slot = sample;
                    drained += 1;
                }
                None => *slot = 0.0,
            }
        }
        if drained > 0 {
            self.rendered.fetch_add(drained, Ordering::AcqRel);
        }
        let pushed = self.pushed.load(Ordering::Acquire);
        let rendered = self.rendered.load(Ordering::Acquire);
        // holds as long as push advances its counter before inserting;
        // not asserted outside tests because clear() may zero the counters
        // while a live device callback is mid-render
        #[cfg(test)]
        assert!(
            rendered <= pushed,
            "rendered {rendered} samples but only {pushed} were pushed"
        );
        if rendered >= pushed
            && self
                .awaiting
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            // Exactly one signal per batch; the receiver side decides
            // whether the protocol is actually finished.
            let _ = self.completion_tx.try_send(());
        }
    }

    /// Discards buffered audio and rearms completion detection.
    pub fn clear(&self) {
        while self.buffer.pop().is_some() {}
        self.pushed.store(0, Ordering::Release);
        self.rendered.store(0, Ordering::Release);
        self.awaiting.store(false, Ordering::Release);
    }

    /// True while samples have been pushed that the clock has not yet
    /// rendered.
    pub fn is_awaiting(&self) -> bool {
        self.awaiting.load(Ordering::Acquire)
    }

    /// Samples currently buffered and not yet rendered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_pcm16le_boundaries() {
        // i16::MIN -> -1.0, i16::MAX -> just under 1.0
        let samples = decode_pcm16le(&[0x00, 0x80, 0xFF, 0x7F, 0x00, 0x00]);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0], -1.0);
        assert!((samples[1] - 0.999_969_5).abs() < 1e-6);
        assert_eq!(samples[2], 0.0);
    }

    #[test]
    fn test_decode_pcm16le_ignores_trailing_byte() {
        let samples = decode_pcm16le(&[0x00, 0x00, 0x12]);
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn test_render_pads_silence_on_underrun() {
        let (sink, _rx) = SampleSink::new(8);
        sink.push(&[0.5, -0.5]);
        let mut out = [1.0f32; 4];
        sink.render(&mut out);
        assert_eq!(out, [0.5, -0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_completion_fires_exactly_once_per_batch() {
        let (sink, mut rx) = SampleSink::new(8);
        sink.push(&[0.1, 0.2, 0.3]);
        assert!(sink.is_awaiting());

        let mut out = [0.0f32; 4];
        sink.render(&mut out);
        assert!(!sink.is_awaiting());
        assert!(rx.try_recv().is_ok());

        // further empty renders do not re-signal
        sink.render(&mut out);
        sink.render(&mut out);
        assert!(rx.try_recv().is_err());

        // a new batch rearms detection
        sink.push(&[0.4]);
        sink.render(&mut out);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_clear_discards_audio_and_disarms() {
        let (sink, mut rx) = SampleSink::new(8);
        sink.push(&[0.9; 5]);
        sink.clear();
        assert!(!sink.is_awaiting());
        assert_eq!(sink.buffered(), 0);

        let mut out = [1.0f32; 4];
        sink.render(&mut out);
        assert_eq!(out, [0.0; 4]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_concurrent_push_and_render_keep_counters_consistent() {
        // render() asserts rendered <= pushed in test builds; hammering
        // both sides concurrently trips it if push ever makes a sample
        // poppable before its counter is advanced
        let (sink, mut rx) = SampleSink::new(16384);
        let total = 200 * 64;

        let producer = {
            let sink = Arc::clone(&sink);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    sink.push(&[0.25; 64]);
                }
            })
        };

        let mut block = [0.0f32; 32];
        let mut rendered = 0usize;
        while rendered < total {
            sink.render(&mut block);
            rendered += block.iter().filter(|s| **s != 0.0).count();
        }
        producer.join().unwrap();

        sink.render(&mut block);
        assert_eq!(sink.buffered(), 0);
        assert!(!sink.is_awaiting());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_overflow_drops_excess_samples() {
        let (sink, _rx) = SampleSink::new(4);
        sink.push(&[0.1; 10]);
        assert_eq!(sink.buffered(), 4);

        let mut out = [0.0f32; 4];
        sink.render(&mut out);
        // all accepted samples rendered, so the batch completes
        assert!(!sink.is_awaiting());
    }
}
