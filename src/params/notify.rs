//! Outbound change stream: one event per committed, actually-dirty parameter write.
use crate::foundation::core::{ShaderId, TargetId};
use crate::program::value::ParameterValue;

/// A parameter change that reached the backend.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterChanged {
    /// Target whose block changed.
    pub target: TargetId,
    /// Program the block belongs to.
    pub shader: ShaderId,
    /// Parameter name.
    pub name: String,
    /// Value last committed, `None` on the first commit of the block.
    pub old: Option<ParameterValue>,
    /// Value just committed.
    pub new: ParameterValue,
}

/// Ticket returned by [`ChangeNotifier::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&ParameterChanged)>;

/// List of change subscribers.
#[derive(Default)]
pub struct ChangeNotifier {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl ChangeNotifier {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. Returns a ticket for [`ChangeNotifier::unsubscribe`].
    pub fn subscribe(&mut self, f: impl FnMut(&ParameterChanged) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(f)));
        id
    }

    /// Remove a callback. Returns `false` when the ticket was already used.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Callers check this before building an event.
    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.is_empty()
    }

    pub(crate) fn emit(&mut self, event: &ParameterChanged) {
        for (_, f) in &mut self.subscribers {
            f(event);
        }
    }
}
