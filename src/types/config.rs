use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{AnalysisError, Network};

/// Settings for one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Skip filters flagged as composite.
    pub ignore_composites: bool,
    /// Classify canonical filters on the rayon thread pool.
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            ignore_composites: false,
            parallel: true,
        }
    }
}

impl AnalysisConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn ignore_composites(mut self, ignore: bool) -> Self {
        self.ignore_composites = ignore;
        self
    }

    #[must_use]
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Which (device, filter) pairs to analyze.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterSelection {
    /// Every filter on every device.
    #[default]
    All,
    /// Every filter on the named devices.
    Devices(Vec<String>),
    /// Explicit (device, filter) pairs.
    Filters(Vec<(String, String)>),
}

impl FilterSelection {
    #[must_use]
    pub fn devices<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        FilterSelection::Devices(names.into_iter().map(str::to_owned).collect())
    }

    #[must_use]
    pub fn filters<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        FilterSelection::Filters(
            pairs
                .into_iter()
                .map(|(d, f)| (d.to_owned(), f.to_owned()))
                .collect(),
        )
    }

    /// Resolve to filter names per device. Names that do not exist are
    /// skipped; devices left with no filters are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::NoFiltersMatched`] if nothing is selected.
    pub fn resolve(
        &self,
        network: &Network,
        ignore_composites: bool,
    ) -> Result<BTreeMap<String, BTreeSet<String>>, AnalysisError> {
        let mut searched: BTreeSet<String> = BTreeSet::new();
        let mut selected: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        let mut select = |device: &str, filter: &str| {
            let Some(f) = network.filter(device, filter) else {
                return;
            };
            if ignore_composites && f.composite {
                return;
            }
            selected
                .entry(device.to_owned())
                .or_default()
                .insert(filter.to_owned());
        };

        match self {
            FilterSelection::All => {
                for (name, device) in &network.devices {
                    searched.insert(name.clone());
                    for filter in device.filters.keys() {
                        select(name, filter);
                    }
                }
            }
            FilterSelection::Devices(names) => {
                for name in names {
                    searched.insert(name.clone());
                    if let Some(device) = network.device(name) {
                        for filter in device.filters.keys() {
                            select(name, filter);
                        }
                    }
                }
            }
            FilterSelection::Filters(pairs) => {
                for (device, filter) in pairs {
                    searched.insert(device.clone());
                    select(device, filter);
                }
            }
        }

        if selected.is_empty() {
            return Err(AnalysisError::NoFiltersMatched {
                devices: searched.into_iter().collect(),
            });
        }
        Ok(selected)
    }
}
