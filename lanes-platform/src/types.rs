// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The serde description of a topology file.

use byte_unit::Byte;
use serde::{Deserialize, de};
use serde_yaml::Value;

pub const DEFAULT_CLOCK_MHZ: f64 = 1000.0;

/// Parse a value which could be an integer or a string and return u64 value
///
/// The string can be a hex string with underscores or a Byte string that
/// specifies units. Some examples are:
///  0x10000000
///  0x1000_0000
///  10B
///  4KiB, 1MiB
pub fn parse_byte_str<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: de::Deserializer<'de>,
{
    // We need to first deserialize to a generic `Value` so that we can
    // support the case where it is already a u64.
    let value: Value = Deserialize::deserialize(deserializer)?;

    if let Some(number) = value.as_u64() {
        return Ok(number);
    }

    let s = match value.as_str() {
        Some(s) => s.to_owned(),
        None => {
            return Err(de::Error::custom(format!(
                "'{value:?}': Unsupported type for Deserialize (should be u64 or String)"
            )));
        }
    };

    // Convert to lowercase in order to standardise any 0x prefix
    let lowercase = s.to_lowercase();

    if lowercase.starts_with("0x") {
        let without_underscore = lowercase.replace('_', "");
        let without_0x = without_underscore.trim_start_matches("0x");
        u64::from_str_radix(without_0x, 16)
            .map_err(|e| de::Error::custom(format!("Unable to parse {s} as hex string: {e}")))
    } else {
        let ignore_case = false;
        let num_bytes = Byte::parse_str(&s, ignore_case)
            .map_err(|e| de::Error::custom(format!("Unable to parse {s} as Byte string: {e}")))?;
        Ok(num_bytes.as_u64())
    }
}

pub fn parse_optional_byte_str<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: de::Deserializer<'de>,
{
    Ok(Some(parse_byte_str(deserializer)?))
}

fn default_clock_mhz() -> f64 {
    DEFAULT_CLOCK_MHZ
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopologyConfig {
    #[serde(default = "default_clock_mhz")]
    pub clock_mhz: f64,
    #[serde(default)]
    pub host: HostSection,
    pub root_complex: RootComplexSection,
    #[serde(default)]
    pub switches: Vec<SwitchSection>,
    #[serde(default)]
    pub endpoints: Vec<EndpointSection>,
    #[serde(default)]
    pub links: Vec<LinkSection>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostSection {
    pub memory_latency_ticks: Option<usize>,
    pub max_outstanding_pio: Option<usize>,
    #[serde(default)]
    pub pio: Vec<OpSection>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RootComplexSection {
    pub name: String,
    pub num_downstream_ports: usize,
    pub latency_ticks: Option<usize>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchSection {
    pub name: String,
    pub num_downstream_ports: usize,
    pub latency_ticks: Option<usize>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointSection {
    pub name: String,

    // Kept wider than the PCI fields so that range errors are reported by
    // validation rather than by the parser.
    pub pci_bus: u32,
    pub pci_dev: u32,
    pub pci_func: u32,
    pub interrupt_line: Option<u8>,
    pub interrupt_pin: Option<u8>,
    #[serde(deserialize_with = "parse_byte_str")]
    pub bar_address: u64,
    #[serde(deserialize_with = "parse_byte_str")]
    pub bar_size: u64,
    pub latency_ticks: Option<usize>,
    pub max_outstanding_dma: Option<usize>,
    #[serde(default)]
    pub dma: Vec<OpSection>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkSection {
    pub name: String,
    pub lanes: Option<u32>,

    /// PCIe generation number.
    pub speed: Option<u8>,
    #[serde(default, deserialize_with = "parse_optional_byte_str")]
    pub max_payload_bytes: Option<u64>,
    pub max_queue_size: Option<usize>,

    /// Binding of the form `kind.name.port`.
    pub upstream: String,
    pub downstream: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Read,
    Write,
}

/// One entry of a PIO or DMA program.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpSection {
    pub kind: OpKind,
    #[serde(deserialize_with = "parse_byte_str")]
    pub address: u64,
    #[serde(default, deserialize_with = "parse_optional_byte_str")]
    pub size: Option<u64>,
    pub data: Option<Vec<u8>>,
}

impl OpSection {
    #[must_use]
    pub fn read(address: u64, size: u64) -> Self {
        Self {
            kind: OpKind::Read,
            address,
            size: Some(size),
            data: None,
        }
    }

    #[must_use]
    pub fn write(address: u64, data: Vec<u8>) -> Self {
        Self {
            kind: OpKind::Write,
            address,
            size: None,
            data: Some(data),
        }
    }

    /// Bytes carried by the request or its completion.
    #[must_use]
    pub fn payload_bytes(&self) -> u64 {
        match self.kind {
            OpKind::Read => self.size.unwrap_or(0),
            OpKind::Write => self.data.as_ref().map_or(0, |d| d.len() as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Sizes {
        #[serde(deserialize_with = "parse_byte_str")]
        a: u64,
        #[serde(deserialize_with = "parse_byte_str")]
        b: u64,
        #[serde(deserialize_with = "parse_byte_str")]
        c: u64,
        #[serde(default, deserialize_with = "parse_optional_byte_str")]
        d: Option<u64>,
    }

    #[test]
    fn byte_strings() {
        let sizes: Sizes = serde_yaml::from_str("{a: 4096, b: 0x4000_0000, c: 1MiB}").unwrap();
        assert_eq!(sizes.a, 4096);
        assert_eq!(sizes.b, 0x4000_0000);
        assert_eq!(sizes.c, 1024 * 1024);
        assert_eq!(sizes.d, None);
    }

    #[test]
    fn bad_byte_string() {
        assert!(serde_yaml::from_str::<Sizes>("{a: 1, b: 0xZZ, c: 1}").is_err());
        assert!(serde_yaml::from_str::<Sizes>("{a: 1, b: [1], c: 1}").is_err());
    }

    #[test]
    fn program_entry() {
        let op: OpSection =
            serde_yaml::from_str("{ kind: write, address: 0x1000, data: [1, 2] }").unwrap();
        assert_eq!(op.kind, OpKind::Write);
        assert_eq!(op.data, Some(vec![1, 2]));
        assert!(serde_yaml::from_str::<OpSection>("{ kind: copy, address: 0 }").is_err());
    }
}
