// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per
//! event to a [`Write`](std::io::Write) destination (default: stderr).

use std::io::Write;

use strata_core::trace::{
    BlockReason, FlushFiredEvent, FlushRegisteredEvent, OpAbortedEvent, OpCompletedEvent,
    OpEnqueuedEvent, ResourceSettledEvent, SurfaceBlockedEvent, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write)
/// destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>) -> Self {
        Self { writer }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }
}

fn block_reason(reason: BlockReason) -> String {
    match reason {
        BlockReason::Resource(id) => format!("resource={}", id.0),
        BlockReason::Fence(surface) => format!("fence=surface{}", surface.index()),
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_op_enqueued(&mut self, e: &OpEnqueuedEvent) {
        let _ = writeln!(
            self.writer,
            "[enqueue] surface={} seq={}",
            e.surface.index(),
            e.seq
        );
    }

    fn on_op_completed(&mut self, e: &OpCompletedEvent) {
        let _ = writeln!(
            self.writer,
            "[complete] surface={} seq={}",
            e.surface.index(),
            e.seq
        );
    }

    fn on_op_aborted(&mut self, e: &OpAbortedEvent) {
        let _ = writeln!(
            self.writer,
            "[abort] surface={} seq={} resource={}",
            e.surface.index(),
            e.seq,
            e.resource.0
        );
    }

    fn on_surface_blocked(&mut self, e: &SurfaceBlockedEvent) {
        let _ = writeln!(
            self.writer,
            "[blocked] surface={} seq={} {}",
            e.surface.index(),
            e.seq,
            block_reason(e.reason)
        );
    }

    fn on_resource_settled(&mut self, e: &ResourceSettledEvent) {
        let _ = writeln!(
            self.writer,
            "[resource] id={} {}",
            e.resource.0,
            if e.failed { "failed" } else { "ready" }
        );
    }

    fn on_flush_registered(&mut self, e: &FlushRegisteredEvent) {
        let _ = writeln!(
            self.writer,
            "[flush+] watermark={} outstanding={}",
            e.watermark, e.outstanding
        );
    }

    fn on_flush_fired(&mut self, e: &FlushFiredEvent) {
        let _ = writeln!(self.writer, "[flush!] watermark={}", e.watermark);
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;
    use std::sync::Mutex;

    use super::*;

    /// A writer that appends into a shared buffer.
    #[derive(Clone, Default)]
    struct Shared(Rc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn events_print_one_line_each() {
        let buffer = Shared::default();
        let sink = PrettyPrintSink::with_writer(buffer.clone());

        let mut display = strata_core::display::Display::new(2, 2);
        display.set_trace_sink(Some(Box::new(sink)));

        // Drive a tiny scenario through the real pipeline.
        let surface = display.surface_of(display.default_layer());
        let resource = display.register_resource();
        display.draw_image(surface, 0, 0, resource);
        display.flush(|| {});
        display
            .resolve_resource(resource, strata_core::pixmap::Pixmap::new(1, 1))
            .unwrap();

        let bytes = buffer.0.lock().unwrap().clone();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("[enqueue] surface=0 seq=0"), "got:\n{text}");
        assert!(text.contains("[blocked] surface=0 seq=0 resource=0"));
        assert!(text.contains("[flush+] watermark=1 outstanding=1"));
        assert!(text.contains("[resource] id=0 ready"));
        assert!(text.contains("[complete] surface=0 seq=0"));
        assert!(text.contains("[flush!] watermark=1"));
    }

    #[test]
    fn aborted_ops_are_reported() {
        let buffer = Shared::default();
        let sink = PrettyPrintSink::with_writer(buffer.clone());

        let mut display = strata_core::display::Display::new(2, 2);
        display.set_trace_sink(Some(Box::new(sink)));

        let surface = display.surface_of(display.default_layer());
        let resource = display.register_resource();
        display.draw_image(surface, 0, 0, resource);
        display.fail_resource(resource).unwrap();

        let bytes = buffer.0.lock().unwrap().clone();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("[resource] id=0 failed"), "got:\n{text}");
        assert!(text.contains("[abort] surface=0 seq=0 resource=0"));
    }
}
