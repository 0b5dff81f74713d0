//! # Log configurations
//!
//! The Crazyflie log subsystem streams blocks of variables sampled at a fixed period. A [LogConfig] describes such a
//! block on the ground: a name, a sampling period and an ordered list of variables in the `group.name` format, each
//! with the type the values should be delivered as.
//!
//! A log block is sent in a single radio packet, this limits a configuration to 26 bytes of data. The sampling
//! period is expressed by the firmware in tens of milliseconds and must fit in one byte, so valid periods are
//! multiples of 10ms between 10ms and 2550ms.
//!
//! ```
//! # use crazyflie_flight::log_config::{LogConfig, LogVarType};
//! # fn build() -> crazyflie_flight::Result<LogConfig> {
//! let mut config = LogConfig::new("Stabilizer", 10)?;
//! config.add_variable("stabilizer.roll", LogVarType::Float)?;
//! config.add_variable("stabilizer.pitch", "float".parse()?)?;
//! # Ok(config)
//! # }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crazyflie_lib::{Value, ValueType};

use crate::{Error, Result};

/// Maximum number of data bytes in a log block
pub const MAX_LOG_DATA_PACKET_SIZE: usize = 26;

const PERIOD_GRANULARITY_MS: u32 = 10;
const MAX_PERIOD_MS: u32 = 255 * PERIOD_GRANULARITY_MS;

/// Type a log variable is fetched as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogVarType {
    /// `uint8_t`
    Uint8,
    /// `uint16_t`
    Uint16,
    /// `uint32_t`
    Uint32,
    /// `int8_t`
    Int8,
    /// `int16_t`
    Int16,
    /// `int32_t`
    Int32,
    /// `float`
    Float,
    /// `FP16`, half precision float
    Fp16,
}

impl LogVarType {
    /// Size of a sample in the log packet
    pub fn byte_length(&self) -> usize {
        match self {
            LogVarType::Uint8 | LogVarType::Int8 => 1,
            LogVarType::Uint16 | LogVarType::Int16 | LogVarType::Fp16 => 2,
            LogVarType::Uint32 | LogVarType::Int32 | LogVarType::Float => 4,
        }
    }

    /// Matching [ValueType] of the Crazyflie lib
    pub fn value_type(&self) -> ValueType {
        match self {
            LogVarType::Uint8 => ValueType::U8,
            LogVarType::Uint16 => ValueType::U16,
            LogVarType::Uint32 => ValueType::U32,
            LogVarType::Int8 => ValueType::I8,
            LogVarType::Int16 => ValueType::I16,
            LogVarType::Int32 => ValueType::I32,
            LogVarType::Float => ValueType::F32,
            LogVarType::Fp16 => ValueType::F16,
        }
    }

    /// Convert a received value to this type
    ///
    /// The conversion goes through `f64` and can lose information, for example when a float is fetched as an
    /// integer.
    pub fn coerce(&self, value: Value) -> Value {
        Value::from_f64_lossy(self.value_type(), value.to_f64_lossy())
    }

    fn as_str(&self) -> &'static str {
        match self {
            LogVarType::Uint8 => "uint8_t",
            LogVarType::Uint16 => "uint16_t",
            LogVarType::Uint32 => "uint32_t",
            LogVarType::Int8 => "int8_t",
            LogVarType::Int16 => "int16_t",
            LogVarType::Int32 => "int32_t",
            LogVarType::Float => "float",
            LogVarType::Fp16 => "FP16",
        }
    }
}

impl FromStr for LogVarType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "uint8_t" => LogVarType::Uint8,
            "uint16_t" => LogVarType::Uint16,
            "uint32_t" => LogVarType::Uint32,
            "int8_t" => LogVarType::Int8,
            "int16_t" => LogVarType::Int16,
            "int32_t" => LogVarType::Int32,
            "float" => LogVarType::Float,
            "FP16" => LogVarType::Fp16,
            _ => return Err(Error::LogConfig(format!("Unknown log type {}", s))),
        })
    }
}

impl fmt::Display for LogVarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One variable of a [LogConfig]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogVariable {
    /// Full name, in the form `group.name`
    pub name: String,
    /// Type the samples are delivered as
    pub fetch_as: LogVarType,
}

/// Named set of log variables sampled at a fixed period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    name: String,
    period_ms: u32,
    variables: Vec<LogVariable>,
}

impl LogConfig {
    /// Create an empty configuration
    ///
    /// Returns [Error::LogConfig] if the period is not a multiple of 10ms between 10ms and 2550ms.
    pub fn new(name: &str, period_in_ms: u32) -> Result<Self> {
        if period_in_ms < PERIOD_GRANULARITY_MS
            || period_in_ms > MAX_PERIOD_MS
            || period_in_ms % PERIOD_GRANULARITY_MS != 0
        {
            return Err(Error::LogConfig(format!(
                "Invalid period {}ms, must be a multiple of {}ms up to {}ms",
                period_in_ms, PERIOD_GRANULARITY_MS, MAX_PERIOD_MS
            )));
        }

        Ok(Self {
            name: name.to_owned(),
            period_ms: period_in_ms,
            variables: Vec::new(),
        })
    }

    /// Add a variable to the configuration
    ///
    /// Returns [Error::LogConfig] if the name is not in the `group.name` format, if the variable is already part of
    /// the configuration or if it would not fit in a log packet.
    pub fn add_variable(&mut self, name: &str, fetch_as: LogVarType) -> Result<()> {
        match name.split_once('.') {
            Some((group, var)) if !group.is_empty() && !var.is_empty() && !var.contains('.') => (),
            _ => {
                return Err(Error::LogConfig(format!(
                    "Variable name {} is not in the group.name format",
                    name
                )))
            }
        }

        if self.variables.iter().any(|v| v.name == name) {
            return Err(Error::LogConfig(format!(
                "Variable {} already in config {}",
                name, self.name
            )));
        }

        if self.data_size() + fetch_as.byte_length() > MAX_LOG_DATA_PACKET_SIZE {
            return Err(Error::LogConfig(format!(
                "Adding {} to {} exceeds the {} bytes packet size",
                name, self.name, MAX_LOG_DATA_PACKET_SIZE
            )));
        }

        self.variables.push(LogVariable {
            name: name.to_owned(),
            fetch_as,
        });

        Ok(())
    }

    /// Name of the configuration
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sampling period in milliseconds
    pub fn period_in_ms(&self) -> u32 {
        self.period_ms
    }

    /// Sampling period
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms as u64)
    }

    /// Variables in the order they were added
    pub fn variables(&self) -> &[LogVariable] {
        &self.variables
    }

    /// Number of data bytes used by the variables
    pub fn data_size(&self) -> usize {
        self.variables.iter().map(|v| v.fetch_as.byte_length()).sum()
    }

    /// Build an entry from raw values received from the Crazyflie
    ///
    /// Values are converted to the declared types, values not part of this configuration are ignored.
    /// Returns [Error::VariableNotFound] if one of the configured variables is missing from `data`.
    pub fn make_entry<'a>(
        &self,
        timestamp: u32,
        data: impl IntoIterator<Item = (&'a String, &'a Value)>,
    ) -> Result<LogEntry> {
        let raw: BTreeMap<&str, Value> = data
            .into_iter()
            .map(|(name, value)| (name.as_str(), *value))
            .collect();

        let mut entry = BTreeMap::new();
        for variable in &self.variables {
            let value = raw
                .get(variable.name.as_str())
                .ok_or_else(|| Error::VariableNotFound(variable.name.clone()))?;
            entry.insert(variable.name.clone(), variable.fetch_as.coerce(*value));
        }

        Ok(LogEntry {
            timestamp,
            data: entry,
            config_name: self.name.clone(),
        })
    }
}

/// Stabilizer attitude sampled every 10ms
pub fn stabilizer() -> LogConfig {
    preset(
        "Stabilizer",
        &["stabilizer.roll", "stabilizer.pitch", "stabilizer.yaw"],
    )
}

/// The two configurations needed to log all TDoA2 distance differences of an 8 anchors LPS system
pub fn tdoa2() -> [LogConfig; 2] {
    [
        preset(
            "tdoa2",
            &["tdoa2.d7-0", "tdoa2.d0-1", "tdoa2.d1-2", "tdoa2.d2-3"],
        ),
        preset(
            "tdoa2",
            &["tdoa2.d3-4", "tdoa2.d4-5", "tdoa2.d5-6", "tdoa2.d6-7"],
        ),
    ]
}

fn preset(name: &str, variables: &[&str]) -> LogConfig {
    LogConfig {
        name: name.to_owned(),
        period_ms: 10,
        variables: variables
            .iter()
            .map(|name| LogVariable {
                name: (*name).to_owned(),
                fetch_as: LogVarType::Float,
            })
            .collect(),
    }
}

/// One sample of a log configuration
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Crazyflie timestamp in milliseconds
    pub timestamp: u32,
    /// Values by variable name
    pub data: BTreeMap<String, Value>,
    /// Name of the configuration that produced this entry
    pub config_name: String,
}

impl LogEntry {
    /// Value of a variable as `f64`
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.data.get(name).map(|v| v.to_f64_lossy())
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{}]: {{", self.timestamp, self.config_name)?;
        for (i, (name, value)) in self.data.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "'{}': {}", name, value.to_f64_lossy())?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_must_fit_the_firmware_resolution() {
        assert!(LogConfig::new("ok", 10).is_ok());
        assert!(LogConfig::new("ok", 2550).is_ok());
        assert!(LogConfig::new("zero", 0).is_err());
        assert!(LogConfig::new("odd", 15).is_err());
        assert!(LogConfig::new("slow", 2560).is_err());
    }

    #[test]
    fn variables_are_checked() {
        let mut config = LogConfig::new("test", 100).unwrap();
        assert!(config.add_variable("stabilizer.roll", LogVarType::Float).is_ok());
        assert!(config.add_variable("stabilizer.roll", LogVarType::Float).is_err());
        assert!(config.add_variable("roll", LogVarType::Float).is_err());
        assert!(config.add_variable(".roll", LogVarType::Float).is_err());
        assert_eq!(config.variables().len(), 1);
    }

    #[test]
    fn packet_size_is_limited() {
        let mut config = LogConfig::new("big", 10).unwrap();
        for i in 0..6 {
            config
                .add_variable(&format!("group.var{}", i), LogVarType::Float)
                .unwrap();
        }
        assert_eq!(config.data_size(), 24);
        assert!(config.add_variable("group.f", LogVarType::Float).is_err());
        assert!(config.add_variable("group.h", LogVarType::Fp16).is_ok());
        assert!(config.add_variable("group.b", LogVarType::Uint8).is_err());
    }

    #[test]
    fn types_parse_from_their_c_names() {
        assert_eq!("float".parse::<LogVarType>().unwrap(), LogVarType::Float);
        assert_eq!("uint16_t".parse::<LogVarType>().unwrap(), LogVarType::Uint16);
        assert_eq!("FP16".parse::<LogVarType>().unwrap(), LogVarType::Fp16);
        assert!("double".parse::<LogVarType>().is_err());
        assert_eq!(LogVarType::Int8.to_string(), "int8_t");
    }

    #[test]
    fn entries_are_coerced_to_the_declared_type() {
        let mut config = LogConfig::new("coerce", 10).unwrap();
        config.add_variable("motor.m1", LogVarType::Uint16).unwrap();

        let raw = vec![
            ("motor.m1".to_owned(), Value::F32(1234.0)),
            ("other.var".to_owned(), Value::U8(1)),
        ];
        let entry = config
            .make_entry(42, raw.iter().map(|(n, v)| (n, v)))
            .unwrap();

        assert_eq!(entry.data.len(), 1);
        assert!(matches!(entry.data["motor.m1"], Value::U16(1234)));
        assert_eq!(entry.to_string(), "[42][coerce]: {'motor.m1': 1234}");
    }

    #[test]
    fn missing_variables_are_reported() {
        let mut config = LogConfig::new("missing", 10).unwrap();
        config.add_variable("a.b", LogVarType::Float).unwrap();
        let raw: Vec<(String, Value)> = Vec::new();
        assert!(matches!(
            config.make_entry(0, raw.iter().map(|(n, v)| (n, v))),
            Err(Error::VariableNotFound(_))
        ));
    }

    #[test]
    fn presets() {
        assert_eq!(stabilizer().variables().len(), 3);
        let [first, second] = tdoa2();
        assert_eq!(first.name(), "tdoa2");
        assert_eq!(first.variables()[0].name, "tdoa2.d7-0");
        assert_eq!(second.variables()[3].name, "tdoa2.d6-7");
        assert_eq!(second.period_in_ms(), 10);
    }
}
