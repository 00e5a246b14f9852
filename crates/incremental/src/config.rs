//! Network configuration.

/// How updates are evaluated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EvaluationMode {
    /// Plain incremental maintenance; recursion is handled by delete-and-rederive.
    #[default]
    Timeless,
    /// Differential evaluation over virtual timestamps.
    Timely,
}

/// How timely memories represent timelines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TimelineRepresentation {
    /// Eager memories that only track the first change of presence.
    FirstOnly,
    /// Lazily folded memories that keep complete timelines.
    #[default]
    Faithful,
}

/// Settings fixed for the lifetime of a network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NetworkConfig {
    pub evaluation_mode: EvaluationMode,
    pub timeline_representation: TimelineRepresentation,
    /// Join outputs share the primary tuple as a prefix instead of copying it.
    pub shared_prefix_tuples: bool,
    /// Identity and empty-mask indexers of uniqueness nodes read the owner's memory.
    pub trivial_indexers: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            evaluation_mode: EvaluationMode::Timeless,
            timeline_representation: TimelineRepresentation::Faithful,
            shared_prefix_tuples: true,
            trivial_indexers: true,
        }
    }
}

impl NetworkConfig {
    pub fn builder() -> NetworkConfigBuilder {
        NetworkConfigBuilder::new()
    }

    #[inline]
    pub fn is_timely(&self) -> bool {
        self.evaluation_mode == EvaluationMode::Timely
    }

    /// Returns true if timely memories fold lazily.
    #[inline]
    pub fn is_lazy(&self) -> bool {
        self.is_timely() && self.timeline_representation == TimelineRepresentation::Faithful
    }
}

/// Builder for [`NetworkConfig`].
#[derive(Clone, Debug, Default)]
pub struct NetworkConfigBuilder {
    config: NetworkConfig,
}

impl NetworkConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: NetworkConfig::default(),
        }
    }

    pub fn evaluation_mode(mut self, mode: EvaluationMode) -> Self {
        self.config.evaluation_mode = mode;
        self
    }

    pub fn timeline_representation(mut self, representation: TimelineRepresentation) -> Self {
        self.config.timeline_representation = representation;
        self
    }

    pub fn shared_prefix_tuples(mut self, enabled: bool) -> Self {
        self.config.shared_prefix_tuples = enabled;
        self
    }

    pub fn trivial_indexers(mut self, enabled: bool) -> Self {
        self.config.trivial_indexers = enabled;
        self
    }

    pub fn build(self) -> NetworkConfig {
        self.config
    }
}
