/// When a pending exclusive acquirer stops new keyed callers from entering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriterPolicy {
    /// Close the reader gate as soon as a writer enqueues. Keyed callers that
    /// are already registered drain; no new ones are admitted, so the writer's
    /// wait is bounded by the work already in flight.
    #[default]
    WriterPriority,

    /// Close the reader gate only once the writer is handed the window. Keyed
    /// callers keep entering while the writer waits, so steady keyed traffic
    /// can starve it.
    Compatible,
}

impl WriterPolicy {
    pub(crate) fn closes_on_enqueue(self) -> bool {
        matches!(self, WriterPolicy::WriterPriority)
    }
}
