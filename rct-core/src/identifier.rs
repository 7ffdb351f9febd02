//! Register identifiers and inverter states

use crate::error::{RctError, RctResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a variable (register) on an RCT device
///
/// Identifiers are opaque 32-bit keys. The associated constants name the
/// registers most commonly read from an inverter; any other value is equally
/// valid on the wire and simply has no label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(u32);

impl Identifier {
    // power
    pub const SOLAR_GEN_A_POWER_W: Identifier = Identifier(0xB5317B78);
    pub const SOLAR_GEN_B_POWER_W: Identifier = Identifier(0xAA9AA253);
    /// Positive values discharge the battery, negative values charge it
    pub const BATTERY_POWER_W: Identifier = Identifier(0x400F015B);
    pub const INVERTER_AC_POWER_W: Identifier = Identifier(0xDB2D69AE);
    pub const REAL_POWER_W: Identifier = Identifier(0x4E49AEC5);
    /// Positive values are taken from the grid, negative values are fed in
    pub const TOTAL_GRID_POWER_W: Identifier = Identifier(0x91617C58);
    /// Range 0 ... 1
    pub const BATTERY_SOC: Identifier = Identifier(0x959930BF);
    pub const S0_EXTERNAL_POWER_W: Identifier = Identifier(0xE96F1844);

    // voltage
    pub const SOLAR_GEN_A_VOLTAGE: Identifier = Identifier(0xB298395D);
    pub const SOLAR_GEN_B_VOLTAGE: Identifier = Identifier(0x5BB8075A);
    pub const BATTERY_VOLTAGE: Identifier = Identifier(0xA7FA5C5D);

    // energy
    pub const TOTAL_ENERGY_WH: Identifier = Identifier(0xB1EF67CE);
    pub const TOTAL_ENERGY_SOLAR_GEN_A_WH: Identifier = Identifier(0xFC724A9E);
    pub const TOTAL_ENERGY_SOLAR_GEN_B_WH: Identifier = Identifier(0x68EEFD3D);
    pub const TOTAL_ENERGY_BATT_IN_WH: Identifier = Identifier(0x5570401B);
    pub const TOTAL_ENERGY_BATT_OUT_WH: Identifier = Identifier(0xA9033880);
    pub const TOTAL_ENERGY_HOUSEHOLD_WH: Identifier = Identifier(0xEFF4B537);
    pub const TOTAL_ENERGY_GRID_WH: Identifier = Identifier(0xA59C8428);
    pub const TOTAL_ENERGY_GRID_FEED_IN_WH: Identifier = Identifier(0x44D4C533);
    pub const TOTAL_ENERGY_GRID_LOAD_WH: Identifier = Identifier(0x62FBE7DC);

    // other
    /// `u8`, see [`InverterState`]
    pub const INVERTER_STATE: Identifier = Identifier(0x5F33284E);
    pub const BATTERY_CAPACITY_AH: Identifier = Identifier(0xB57B59BD);
    pub const BATTERY_TEMPERATURE_C: Identifier = Identifier(0x902AFAFB);
    pub const BATTERY_SOC_TARGET: Identifier = Identifier(0x8B9FF008);
    pub const BATTERY_SOC_TARGET_HIGH: Identifier = Identifier(0xB84A38AB);
    pub const BATTERY_SOC_TARGET_MIN: Identifier = Identifier(0xCE266F0F);
    pub const BATTERY_SOC_TARGET_MIN_ISLAND: Identifier = Identifier(0x8EBF9574);

    /// Create an identifier from its raw value
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Get the raw 32-bit value
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Get the identifier as big-endian wire bytes
    pub fn to_be_bytes(&self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Get the human-readable label of a well-known identifier
    ///
    /// Labels are for diagnostics only; protocol handling never depends on them.
    pub fn label(&self) -> Option<&'static str> {
        let label = match *self {
            Self::SOLAR_GEN_A_POWER_W => "Solar generator A power [W]",
            Self::SOLAR_GEN_B_POWER_W => "Solar generator B power [W]",
            Self::BATTERY_POWER_W => "Battery power [W]",
            Self::INVERTER_AC_POWER_W => "Inverter AC power [W]",
            Self::REAL_POWER_W => "Real power [W]",
            Self::TOTAL_GRID_POWER_W => "Total grid power [W]",
            Self::BATTERY_SOC => "Battery state of charge",
            Self::SOLAR_GEN_A_VOLTAGE => "Solar generator A voltage [V]",
            Self::SOLAR_GEN_B_VOLTAGE => "Solar generator B voltage [V]",
            Self::BATTERY_VOLTAGE => "Battery voltage [V]",
            Self::TOTAL_ENERGY_WH => "Total energy [Wh]",
            Self::TOTAL_ENERGY_SOLAR_GEN_A_WH => "Total energy solarGenA [Wh]",
            Self::TOTAL_ENERGY_SOLAR_GEN_B_WH => "Total energy solarGenB [Wh]",
            Self::TOTAL_ENERGY_BATT_IN_WH => "Total energy batt in [Wh]",
            Self::TOTAL_ENERGY_BATT_OUT_WH => "Total energy batt out [Wh]",
            Self::TOTAL_ENERGY_HOUSEHOLD_WH => "Total energy household [Wh]",
            Self::TOTAL_ENERGY_GRID_WH => "Total energy grid [Wh]",
            Self::TOTAL_ENERGY_GRID_FEED_IN_WH => "Total energy grid feed in [Wh]",
            Self::TOTAL_ENERGY_GRID_LOAD_WH => "Total energy grid load [Wh]",
            Self::INVERTER_STATE => "Inverter state",
            Self::BATTERY_CAPACITY_AH => "Battery capacity [Ah]",
            Self::BATTERY_TEMPERATURE_C => "Battery temperature [°C]",
            Self::BATTERY_SOC_TARGET => "Battery SoC target",
            Self::BATTERY_SOC_TARGET_HIGH => "Battery SoC target high",
            Self::BATTERY_SOC_TARGET_MIN => "Battery SoC target min",
            Self::BATTERY_SOC_TARGET_MIN_ISLAND => "Battery SoC target min island",
            _ => return None,
        };
        Some(label)
    }
}

impl From<u32> for Identifier {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Identifier> for u32 {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label().unwrap_or("#INVALID"))
    }
}

/// Operating state reported by [`Identifier::INVERTER_STATE`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InverterState {
    Standby = 0,
    Initialization = 1,
    Standby2 = 2,
    Efficiency = 3,
    InsulationCheck = 4,
    IslandCheck = 5,
    PowerCheck = 6,
    Symmetry = 7,
    RelayTest = 8,
    GridPassive = 9,
    PrepareBattPassive = 10,
    BattPassive = 11,
    HwCheck = 12,
    FeedIn = 13,
}

impl InverterState {
    const ALL: [InverterState; 14] = [
        InverterState::Standby,
        InverterState::Initialization,
        InverterState::Standby2,
        InverterState::Efficiency,
        InverterState::InsulationCheck,
        InverterState::IslandCheck,
        InverterState::PowerCheck,
        InverterState::Symmetry,
        InverterState::RelayTest,
        InverterState::GridPassive,
        InverterState::PrepareBattPassive,
        InverterState::BattPassive,
        InverterState::HwCheck,
        InverterState::FeedIn,
    ];

    /// Get the human-readable state description
    pub fn description(self) -> &'static str {
        match self {
            InverterState::Standby => "Standby",
            InverterState::Initialization => "Initialization",
            InverterState::Standby2 => "Standby2",
            InverterState::Efficiency => "Efficiency",
            InverterState::InsulationCheck => "Insulation check",
            InverterState::IslandCheck => "Island check",
            InverterState::PowerCheck => "Power check",
            InverterState::Symmetry => "Symmetry",
            InverterState::RelayTest => "Relay test",
            InverterState::GridPassive => "Grid passive",
            InverterState::PrepareBattPassive => "Prepare battery passive",
            InverterState::BattPassive => "Battery passive",
            InverterState::HwCheck => "Hardware check",
            InverterState::FeedIn => "Feed in",
        }
    }
}

impl TryFrom<u8> for InverterState {
    type Error = RctError;

    fn try_from(value: u8) -> RctResult<Self> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| RctError::InvalidData(format!("Unknown inverter state: {}", value)))
    }
}

impl fmt::Display for InverterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
