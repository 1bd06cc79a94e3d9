//! The hardware configuration a program is validated against.
//!
//! The configuration is owned by the caller and only ever read. Loading it
//! from disk is the caller's business; it is a plain `serde` value.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ports and operations of one element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementConfig {
    /// Input ports, the ones measurements and demodulations read from.
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Operation name to pulse name.
    #[serde(default)]
    pub operations: BTreeMap<String, String>,
}

impl ElementConfig {
    pub fn with_input<S: ToString>(mut self, port: S) -> Self {
        self.inputs.push(port.to_string());
        self
    }

    pub fn with_output<S: ToString>(mut self, port: S) -> Self {
        self.outputs.push(port.to_string());
        self
    }

    pub fn with_operation<O: ToString, P: ToString>(
        mut self,
        operation: O,
        pulse: P,
    ) -> Self {
        self.operations.insert(operation.to_string(), pulse.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseConfig {
    /// Length in nanoseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default)]
    pub integration_weights: Vec<String>,
}

impl PulseConfig {
    pub fn with_weights<S: ToString>(mut self, weights: S) -> Self {
        self.integration_weights.push(weights.to_string());
        self
    }
}

/// Mapping of element and pulse names to their physical description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareConfig {
    #[serde(default)]
    pub elements: BTreeMap<String, ElementConfig>,
    #[serde(default)]
    pub pulses: BTreeMap<String, PulseConfig>,
}

impl HardwareConfig {
    /// A configuration with no elements. Valid for programs that do not
    /// touch hardware.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_element<S: ToString>(
        mut self,
        name: S,
        element: ElementConfig,
    ) -> Self {
        self.elements.insert(name.to_string(), element);
        self
    }

    pub fn with_pulse<S: ToString>(mut self, name: S, pulse: PulseConfig) -> Self {
        self.pulses.insert(name.to_string(), pulse);
        self
    }

    pub fn element(&self, name: &str) -> Option<&ElementConfig> {
        self.elements.get(name)
    }

    pub fn pulse(&self, name: &str) -> Option<&PulseConfig> {
        self.pulses.get(name)
    }
}
