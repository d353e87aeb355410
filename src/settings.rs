//! Negotiated SETTINGS state for one side of a connection, per RFC 7540
//! §6.5.2. Values are last-write-wins, mirroring the original
//! `SettingsList` builder, but keyed by parameter rather than stored as an
//! ordered append-log.

use crate::types::SettingsParameter;
use enum_map::EnumMap;

/// RFC 7540 §6.5.2 initial values.
#[derive(Debug, Clone, Copy)]
pub struct SettingsList {
    values: EnumMap<SettingsParameter, u32>,
}

impl Default for SettingsList {
    fn default() -> Self {
        let mut values = EnumMap::default();
        values[SettingsParameter::HeaderTableSize] = 4096;
        values[SettingsParameter::EnablePush] = 1;
        values[SettingsParameter::MaxConcurrentStreams] = u32::MAX;
        values[SettingsParameter::InitialWindowSize] = 65_535;
        values[SettingsParameter::MaxFrameSize] = 16_384;
        values[SettingsParameter::MaxHeaderListSize] = u32::MAX;
        Self { values }
    }
}

impl SettingsList {
    pub fn get(&self, param: SettingsParameter) -> u32 {
        self.values[param]
    }

    pub fn set(&mut self, param: SettingsParameter, value: u32) {
        self.values[param] = value;
    }

    /// Applies every (parameter, value) pair decoded from a SETTINGS
    /// frame, ignoring unrecognized parameter ids (RFC 7540 §6.5.2).
    pub fn apply_all(&mut self, pairs: &[(SettingsParameter, u32)]) {
        for &(param, value) in pairs {
            self.set(param, value);
        }
    }
}
