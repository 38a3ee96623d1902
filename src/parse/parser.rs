use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use super::ParseError;
use crate::{Device, Filter, IpSpace, Network};

/// The result of parsing a network DSL string, before name checks.
#[derive(Debug, Default)]
pub struct ParsedNetwork {
    pub devices: Vec<ParsedDevice>,
}

/// One `device { ... }` block, items in source order.
#[derive(Debug, Default)]
pub struct ParsedDevice {
    pub name: String,
    pub interfaces: Vec<String>,
    pub ip_spaces: Vec<(String, IpSpace)>,
    pub filters: Vec<Filter>,
}

fn insert_unique<V>(
    map: &mut BTreeMap<String, V>,
    name: String,
    value: V,
    what: impl FnOnce(&str) -> String,
) -> Result<(), ParseError> {
    match map.entry(name) {
        Entry::Occupied(e) => Err(ParseError::new(what(e.key()))),
        Entry::Vacant(e) => {
            e.insert(value);
            Ok(())
        }
    }
}

impl ParsedDevice {
    fn into_device(self) -> Result<Device, ParseError> {
        let mut device = Device::new(&self.name);
        device.interfaces.extend(self.interfaces);
        for (name, space) in self.ip_spaces {
            insert_unique(&mut device.ip_spaces, name, space, |n| {
                format!("duplicate ip space '{n}' on device '{}'", self.name)
            })?;
        }
        for filter in self.filters {
            insert_unique(&mut device.filters, filter.name.clone(), filter, |n| {
                format!("duplicate filter '{n}' on device '{}'", self.name)
            })?;
        }
        Ok(device)
    }
}

impl ParsedNetwork {
    /// Build the [`Network`], rejecting duplicate device, filter, and ip-space
    /// names.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] naming the first duplicate found.
    pub fn into_network(self) -> Result<Network, ParseError> {
        let mut devices = BTreeMap::new();
        for parsed in self.devices {
            let device = parsed.into_device()?;
            insert_unique(&mut devices, device.name.clone(), device, |n| {
                format!("duplicate device '{n}'")
            })?;
        }
        Ok(Network { devices })
    }
}

#[cfg(test)]
mod tests {
    use crate::parse::parse;

    #[test]
    fn duplicate_filter_rejected() {
        let parsed = parse("device r { filter f { } filter f { } }").unwrap();
        let err = parsed.into_network().unwrap_err();
        assert_eq!(err.message(), "duplicate filter 'f' on device 'r'");
    }

    #[test]
    fn duplicate_device_rejected() {
        let parsed = parse("device r { } device r { }").unwrap();
        let err = parsed.into_network().unwrap_err();
        assert_eq!(err.message(), "duplicate device 'r'");
    }

    #[test]
    fn duplicate_ip_space_rejected() {
        let parsed = parse("device r { ip-space a = any ip-space a = none }").unwrap();
        assert!(parsed.into_network().is_err());
    }

    #[test]
    fn interfaces_accumulate() {
        let network = parse("device r { interface a, b interface c }")
            .unwrap()
            .into_network()
            .unwrap();
        assert_eq!(network.device("r").unwrap().interfaces.len(), 3);
    }
}
