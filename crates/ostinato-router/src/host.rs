//! The audio-transport seam.
//!
//! The router never talks to an audio API directly; the embedder hands it a
//! [`MidiHost`] for the duration of one period. Input buffers deliver events
//! as `(time, bytes)` with `time` in frames from the period start; output
//! buffers are write-only and cleared at the start of the period. Ports are
//! identified by the router's own stable indices -- the host is expected to
//! have registered one transport port per router port at start-up.
//!
//! Host failures are soft: a port whose buffer cannot be acquired reports no
//! events, a failed write returns `false`, and the router skips and carries
//! on.

pub trait MidiHost {
    /// Number of events pending on input `port` this period. Ports without a
    /// host buffer (or whose buffer could not be acquired) report 0.
    fn input_event_count(&mut self, port: usize) -> u32;

    /// Copy input event `index` into `buf`, returning its time and length.
    /// Events are delivered in non-decreasing time order.
    fn input_event(&mut self, port: usize, index: u32, buf: &mut [u8]) -> Option<(u32, usize)>;

    /// Clear output `port`'s buffer at the start of a period.
    fn clear_output(&mut self, port: usize);

    /// Append an event to output `port` at `time`. Returns `false` when the
    /// buffer is exhausted or the port is unavailable.
    fn write_event(&mut self, port: usize, time: u32, bytes: &[u8]) -> bool;

    /// Current connection count of output `port`. Unconnected outputs are
    /// skipped entirely by the router.
    fn connection_count(&self, port: usize) -> u32;
}
