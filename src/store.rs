//! Fixed capacity table of effect blocks
use log::{info, trace, warn};

use crate::effect::{Condition, Effect, EffectState, EffectType, DURATION_INFINITE, MAX_FFB_AXIS_COUNT};
use crate::report::{
    SetConditionReport, SetConstantForceReport, SetEffectReport, SetEnvelopeReport,
    SetPeriodicReport, SetRampForceReport, ALL_EFFECTS, LOOP_INFINITE,
};
use crate::{MillisInstant, PidError};

pub const MAX_EFFECTS: usize = 14;
/// Bytes of device memory accounted per effect block
pub const EFFECT_BLOCK_SIZE: u16 = 64;
pub const MEMORY_SIZE: u16 = MAX_EFFECTS as u16 * EFFECT_BLOCK_SIZE;

const FIRST_INDEX: u8 = 1;
const LAST_INDEX: u8 = MAX_EFFECTS as u8;
/// Longest finite duration, one below [`DURATION_INFINITE`]
const DURATION_MAX_FINITE: u16 = DURATION_INFINITE - 1;

/// Effect blocks addressed by their 1 based effect block index
#[derive(Debug)]
pub struct EffectStore {
    effects: [Effect; MAX_EFFECTS],
    next_index: u8,
}

impl Default for EffectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            effects: [Effect::default(); MAX_EFFECTS],
            next_index: FIRST_INDEX,
        }
    }

    /// Claim the lowest free block, returning its index
    pub fn allocate(&mut self) -> Result<u8, PidError> {
        let index = (self.next_index..=LAST_INDEX)
            .chain(FIRST_INDEX..self.next_index)
            .find(|&i| self.get(i).map_or(false, |e| e.state == EffectState::Free))
            .ok_or(PidError::PoolFull)?;

        self.next_index = index;
        if let Some(effect) = self.slot_mut(index) {
            *effect = Effect::allocated();
        }
        info!("Allocated effect index={}", index);
        Ok(index)
    }

    /// Release one block, or every block for [`ALL_EFFECTS`]
    pub fn free(&mut self, index: u8) {
        if index == ALL_EFFECTS {
            self.effects = [Effect::default(); MAX_EFFECTS];
            self.next_index = FIRST_INDEX;
            info!("Freed all effects");
            return;
        }

        match self.slot_mut(index) {
            Some(effect) => {
                *effect = Effect::default();
                if index < self.next_index {
                    self.next_index = index;
                }
                info!("Freed effect index={}", index);
            }
            None => warn!("Block free for invalid effect index={}", index),
        }
    }

    #[must_use]
    pub fn get(&self, index: u8) -> Option<&Effect> {
        index
            .checked_sub(FIRST_INDEX)
            .and_then(|i| self.effects.get(usize::from(i)))
    }

    /// Checked mutable access, `None` when out of range
    pub fn get_mut(&mut self, index: u8) -> Option<&mut Effect> {
        self.slot_mut(index)
    }

    fn slot_mut(&mut self, index: u8) -> Option<&mut Effect> {
        index
            .checked_sub(FIRST_INDEX)
            .and_then(|i| self.effects.get_mut(usize::from(i)))
    }

    /// Mutable access to an allocated or playing block
    fn live_mut(&mut self, index: u8) -> Result<&mut Effect, PidError> {
        match self.slot_mut(index) {
            Some(effect) if effect.state != EffectState::Free => Ok(effect),
            _ => Err(PidError::InvalidEffectIndex(index)),
        }
    }

    pub fn start(
        &mut self,
        index: u8,
        solo: bool,
        loop_count: u8,
        now: MillisInstant,
    ) -> Result<(), PidError> {
        self.live_mut(index)?;
        if solo {
            self.stop_all();
        }

        let effect = self.live_mut(index)?;
        if loop_count == LOOP_INFINITE {
            effect.duration = DURATION_INFINITE;
        } else if !effect.is_infinite() {
            effect.duration = effect
                .duration
                .saturating_mul(u16::from(loop_count.max(1)))
                .min(DURATION_MAX_FINITE);
        }
        effect.state = EffectState::Playing;
        effect.elapsed_time = 0;
        effect.start_time = Some(now);
        trace!(
            "Started effect index={} solo={} duration={}",
            index,
            solo,
            effect.duration
        );
        Ok(())
    }

    pub fn stop(&mut self, index: u8) -> Result<(), PidError> {
        let effect = self.live_mut(index)?;
        if effect.state == EffectState::Playing {
            effect.state = EffectState::Allocated;
        }
        Ok(())
    }

    pub fn stop_all(&mut self) {
        self.effects
            .iter_mut()
            .filter(|e| e.state == EffectState::Playing)
            .for_each(|e| e.state = EffectState::Allocated);
    }

    /// Refresh elapsed times of playing blocks, retiring the ones past a finite duration
    pub fn advance(&mut self, now: MillisInstant) {
        for (index, effect) in (FIRST_INDEX..).zip(self.effects.iter_mut()) {
            if effect.state != EffectState::Playing {
                continue;
            }
            let elapsed = effect
                .start_time
                .and_then(|start| now.checked_duration_since(start))
                .map_or(0, |d| d.to_millis());
            effect.elapsed_time = elapsed;

            if !effect.is_infinite() && elapsed > u32::from(effect.duration) {
                effect.state = EffectState::Allocated;
                effect.elapsed_time = effect.duration.into();
                trace!("Effect finished index={}", index);
            }
        }
    }

    #[must_use]
    pub fn free_slots(&self) -> usize {
        self.effects
            .iter()
            .filter(|e| e.state == EffectState::Free)
            .count()
    }

    #[must_use]
    pub fn ram_pool_available(&self) -> u16 {
        // at most MAX_EFFECTS
        self.free_slots() as u16 * EFFECT_BLOCK_SIZE
    }

    /// `(index, effect)` for every block, free ones included
    pub fn iter(&self) -> impl Iterator<Item = (u8, &Effect)> {
        (FIRST_INDEX..).zip(self.effects.iter())
    }

    pub fn set_effect_type(&mut self, index: u8, effect_type: EffectType) -> Result<(), PidError> {
        self.live_mut(index)?.effect_type = Some(effect_type);
        Ok(())
    }

    pub fn set_effect(&mut self, report: &SetEffectReport) -> Result<(), PidError> {
        let effect = self.live_mut(report.effect_block_index)?;
        if let Some(effect_type) = report.effect_type() {
            effect.effect_type = Some(effect_type);
        }
        effect.duration = report.duration;
        effect.gain = report.gain;
        effect.enable_axis = report.enable_axis;
        effect.direction_x = report.direction_x;
        effect.direction_y = report.direction_y;
        Ok(())
    }

    pub fn set_envelope(&mut self, report: &SetEnvelopeReport) -> Result<(), PidError> {
        let effect = self.live_mut(report.effect_block_index)?;
        effect.attack_level = level(report.attack_level);
        effect.fade_level = level(report.fade_level);
        effect.attack_time = millis(report.attack_time);
        effect.fade_time = millis(report.fade_time);
        Ok(())
    }

    pub fn set_condition(&mut self, report: &SetConditionReport) -> Result<(), PidError> {
        let axis = usize::from(report.axis());
        if axis >= MAX_FFB_AXIS_COUNT {
            warn!("Condition for unsupported axis={} index={}", axis, report.effect_block_index);
            return Ok(());
        }

        let effect = self.live_mut(report.effect_block_index)?;
        if let Some(condition) = effect.conditions.get_mut(axis) {
            *condition = Condition {
                cp_offset: report.cp_offset,
                positive_coefficient: report.positive_coefficient,
                negative_coefficient: report.negative_coefficient,
                positive_saturation: report.positive_saturation,
                negative_saturation: report.negative_saturation,
                dead_band: report.dead_band,
            };
        }
        // axis is below MAX_FFB_AXIS_COUNT
        effect.condition_block_count = effect.condition_block_count.max(axis as u8 + 1);
        Ok(())
    }

    pub fn set_periodic(&mut self, report: &SetPeriodicReport) -> Result<(), PidError> {
        let effect = self.live_mut(report.effect_block_index)?;
        effect.magnitude = level(report.magnitude);
        effect.offset = report.offset;
        effect.phase = report.phase;
        effect.period = millis(report.period);
        Ok(())
    }

    pub fn set_constant_force(&mut self, report: &SetConstantForceReport) -> Result<(), PidError> {
        self.live_mut(report.effect_block_index)?.magnitude = report.magnitude;
        Ok(())
    }

    pub fn set_ramp_force(&mut self, report: &SetRampForceReport) -> Result<(), PidError> {
        let effect = self.live_mut(report.effect_block_index)?;
        effect.start_magnitude = report.start_magnitude;
        effect.end_magnitude = report.end_magnitude;
        Ok(())
    }
}

fn level(value: u16) -> i16 {
    i16::try_from(value).unwrap_or(i16::MAX)
}

fn millis(value: u32) -> u16 {
    u16::try_from(value).unwrap_or(DURATION_MAX_FINITE)
}
