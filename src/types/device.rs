use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Filter, FilterBuilder, IpSpace};
use crate::AclReachError;

/// The already-parsed configuration of one device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Device {
    pub name: String,
    pub interfaces: BTreeSet<String>,
    pub ip_spaces: BTreeMap<String, IpSpace>,
    pub filters: BTreeMap<String, Filter>,
}

impl Device {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn filter(&self, name: &str) -> Option<&Filter> {
        self.filters.get(name)
    }

    #[must_use]
    pub fn ip_space(&self, name: &str) -> Option<&IpSpace> {
        self.ip_spaces.get(name)
    }

    /// Map keys are authoritative for names.
    fn normalize_names(&mut self) {
        for (name, filter) in &mut self.filters {
            filter.name.clone_from(name);
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "device {} {{", self.name)?;
        if !self.interfaces.is_empty() {
            let names: Vec<&str> = self.interfaces.iter().map(String::as_str).collect();
            writeln!(f, "    interface {}", names.join(", "))?;
        }
        for (name, space) in &self.ip_spaces {
            writeln!(f, "    ip-space {name} = {space}")?;
        }
        for filter in self.filters.values() {
            for line in filter.to_string().lines() {
                writeln!(f, "    {line}")?;
            }
        }
        write!(f, "}}")
    }
}

/// Builder passed to [`NetworkBuilder::device`].
#[derive(Debug)]
#[must_use]
pub struct DeviceBuilder {
    device: Device,
}

impl DeviceBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            device: Device::new(name),
        }
    }

    pub fn interfaces<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.device
            .interfaces
            .extend(names.into_iter().map(str::to_owned));
        self
    }

    pub fn ip_space(mut self, name: &str, space: impl Into<IpSpace>) -> Self {
        self.device.ip_spaces.insert(name.to_owned(), space.into());
        self
    }

    /// Define a filter. A later definition with the same name replaces an
    /// earlier one.
    pub fn filter(mut self, name: &str, f: impl FnOnce(FilterBuilder) -> FilterBuilder) -> Self {
        let filter = f(FilterBuilder::new(name)).build();
        self.device.filters.insert(name.to_owned(), filter);
        self
    }

    pub fn build(self) -> Device {
        self.device
    }
}

/// All devices under analysis, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Network {
    pub devices: BTreeMap<String, Device>,
}

impl Network {
    #[must_use]
    pub fn builder() -> NetworkBuilder {
        NetworkBuilder::default()
    }

    #[must_use]
    pub fn device(&self, name: &str) -> Option<&Device> {
        self.devices.get(name)
    }

    #[must_use]
    pub fn filter(&self, device: &str, filter: &str) -> Option<&Filter> {
        self.device(device).and_then(|d| d.filter(filter))
    }

    /// Load a network from its JSON form. Device and filter names are taken
    /// from their map keys.
    ///
    /// # Errors
    ///
    /// Returns [`AclReachError::Json`] if the input is not a valid network.
    pub fn from_json(input: &str) -> Result<Self, AclReachError> {
        let mut network: Network = serde_json::from_str(input)?;
        for (name, device) in &mut network.devices {
            device.name.clone_from(name);
            device.normalize_names();
        }
        Ok(network)
    }

    /// Read a JSON file and load the network it contains.
    ///
    /// # Errors
    ///
    /// Returns [`AclReachError`] on I/O or JSON failure.
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self, AclReachError> {
        let input = std::fs::read_to_string(path)?;
        Self::from_json(&input)
    }

    /// Parse a network DSL string.
    ///
    /// # Errors
    ///
    /// Returns [`AclReachError::Parse`] if the input is not valid DSL.
    pub fn from_dsl(input: &str) -> Result<Self, AclReachError> {
        let parsed = crate::parse::parse(input)?;
        Ok(parsed.into_network()?)
    }

    /// Read a DSL file and parse the network it contains.
    ///
    /// # Errors
    ///
    /// Returns [`AclReachError`] on I/O or parse failure.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, AclReachError> {
        let input = std::fs::read_to_string(path)?;
        Self::from_dsl(&input)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, device) in self.devices.values().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{device}")?;
        }
        Ok(())
    }
}

/// Builder for a [`Network`].
///
/// # Example
///
/// ```
/// use aclreach::{Network, permitted_by, MatchExpr};
///
/// let network = Network::builder()
///     .device("r1", |d| {
///         d.interfaces(["eth0", "eth1"])
///             .filter("mgmt", |f| f.permit(MatchExpr::FromDevice))
///             .filter("in", |f| f.permit(permitted_by("mgmt")).deny(MatchExpr::True))
///     })
///     .build();
/// assert_eq!(network.device("r1").unwrap().filters.len(), 2);
/// ```
#[derive(Debug, Default)]
#[must_use]
pub struct NetworkBuilder {
    devices: BTreeMap<String, Device>,
}

impl NetworkBuilder {
    pub fn device(mut self, name: &str, f: impl FnOnce(DeviceBuilder) -> DeviceBuilder) -> Self {
        let device = f(DeviceBuilder::new(name)).build();
        self.devices.insert(name.to_owned(), device);
        self
    }

    pub fn build(self) -> Network {
        Network {
            devices: self.devices,
        }
    }
}
