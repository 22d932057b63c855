//! Provider regions and the curated region presets

use std::fmt;

use crate::error::{Result, RotatorError};

/// Regions in the US, Canada and Europe
pub const DEFAULT_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-central-1",
    "ca-central-1",
];

/// Default regions plus Asia Pacific and South America
pub const EXTRA_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-central-1",
    "ca-central-1",
    "ap-south-1",
    "ap-northeast-3",
    "ap-northeast-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-1",
    "sa-east-1",
];

/// Extra regions plus the ones that must be enabled manually on the account
pub const ALL_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-central-1",
    "ca-central-1",
    "ap-south-1",
    "ap-northeast-3",
    "ap-northeast-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-1",
    "sa-east-1",
    "ap-east-1",
    "af-south-1",
    "eu-south-1",
    "me-south-1",
    "eu-north-1",
];

/// Named region presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionPreset {
    #[default]
    Default,
    Extra,
    All,
}

impl RegionPreset {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "default" => Some(Self::Default),
            "extra" => Some(Self::Extra),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Extra => "extra",
            Self::All => "all",
        }
    }

    pub fn regions(&self) -> &'static [&'static str] {
        match self {
            Self::Default => DEFAULT_REGIONS,
            Self::Extra => EXTRA_REGIONS,
            Self::All => ALL_REGIONS,
        }
    }
}

/// Non-empty, duplicate-free, ordered set of known regions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSet(Vec<String>);

impl RegionSet {
    /// Build a region set, keeping the first occurrence of each region
    ///
    /// An empty input yields the default preset.
    pub fn new<I, S>(regions: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set: Vec<String> = Vec::new();
        for region in regions {
            let region = region.as_ref().trim();
            if region.is_empty() {
                continue;
            }
            if !ALL_REGIONS.contains(&region) {
                return Err(RotatorError::InvalidRegion(region.to_string()));
            }
            if !set.iter().any(|r| r == region) {
                set.push(region.to_string());
            }
        }

        if set.is_empty() {
            return Ok(Self::preset(RegionPreset::Default));
        }
        Ok(Self(set))
    }

    pub fn preset(preset: RegionPreset) -> Self {
        Self(preset.regions().iter().map(|r| r.to_string()).collect())
    }

    /// Parse either a preset name or a comma-separated region list
    pub fn parse(raw: &str) -> Result<Self> {
        match RegionPreset::from_str(raw) {
            Some(preset) => Ok(Self::preset(preset)),
            None => Self::new(raw.split(',')),
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for RegionSet {
    fn default() -> Self {
        Self::preset(RegionPreset::Default)
    }
}

impl fmt::Display for RegionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}
