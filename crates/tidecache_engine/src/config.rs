//! Configuration for data providers.

/// Rule governing when a reconciliation starts without an explicit refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerPolicy {
    /// Reconcile once as soon as the provider is constructed.
    OnInitialization,
    /// Reconcile when the registry goes from zero to one observer.
    OnAddObserver,
    /// Only reconcile on [`refresh`](crate::DataProvider::refresh).
    #[default]
    None,
}

/// Provider lifecycle events a trigger policy is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    /// The provider was constructed.
    Initialized,
    /// The first observer was added to an empty registry.
    FirstObserverAdded,
}

impl TriggerPolicy {
    /// Returns true if `event` should start a reconciliation.
    pub fn fires_on(self, event: TriggerEvent) -> bool {
        matches!(
            (self, event),
            (TriggerPolicy::OnInitialization, TriggerEvent::Initialized)
                | (TriggerPolicy::OnAddObserver, TriggerEvent::FirstObserverAdded)
        )
    }
}

/// Configuration for a data provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// When reconciliations start automatically.
    pub trigger: TriggerPolicy,
    /// Name used in log records emitted by this provider.
    pub label: String,
}

impl ProviderConfig {
    /// Creates a configuration with the given trigger policy.
    pub fn new(trigger: TriggerPolicy) -> Self {
        Self {
            trigger,
            label: "provider".into(),
        }
    }

    /// Sets the trigger policy.
    pub fn with_trigger(mut self, trigger: TriggerPolicy) -> Self {
        self.trigger = trigger;
        self
    }

    /// Sets the log label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new(TriggerPolicy::None)
    }
}
