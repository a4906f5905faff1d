use crate::expression::ExpressionEvent;

/// Events waiting for webhook delivery, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryBuffer {
    events: Vec<ExpressionEvent>,
}

impl DeliveryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ExpressionEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[ExpressionEvent] {
        &self.events
    }

    /// Copy of the current contents, handed to an in-flight delivery.
    pub fn snapshot(&self) -> Vec<ExpressionEvent> {
        self.events.clone()
    }

    /// Remove the `delivered` oldest events after the webhook accepted them.
    ///
    /// Events appended after the snapshot was taken are kept.
    pub fn acknowledge(&mut self, delivered: usize) {
        let delivered = delivered.min(self.events.len());
        self.events.drain(..delivered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::DetectionInterval;

    fn event(label: &str) -> ExpressionEvent {
        ExpressionEvent::from_run(label, 1, 0, DetectionInterval::Unresolved)
    }

    #[test]
    fn test_push_preserves_order() {
        let mut buffer = DeliveryBuffer::new();
        buffer.push(event("a"));
        buffer.push(event("b"));

        let labels: Vec<&str> = buffer.events().iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "b"]);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_acknowledge_keeps_late_events() {
        let mut buffer = DeliveryBuffer::new();
        buffer.push(event("a"));
        buffer.push(event("b"));
        let snapshot = buffer.snapshot();

        buffer.push(event("late"));
        buffer.acknowledge(snapshot.len());

        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.events()[0].label, "late");
    }

    #[test]
    fn test_acknowledge_more_than_buffered() {
        let mut buffer = DeliveryBuffer::new();
        buffer.push(event("a"));
        buffer.acknowledge(5);
        assert!(buffer.is_empty());
    }
}
