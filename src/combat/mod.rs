//! Combat Resolver
//!
//! Turns "attacker is in range and off cooldown" into damage, knockback,
//! status effects and visuals. Includes:
//! - Attack modality dispatch (instant, projectile, area, arc)
//! - Shared hit resolution: armor, incoming multipliers, HP clamping
//! - Destruction with rewards, and knockback for survivors
//! - Damage-over-time ticks
//!
//! Every lookup tolerates ids destroyed earlier in the same tick; a missing
//! or dead entity is skipped silently.

pub mod damage;
pub mod events;
pub mod log;
pub mod projectiles;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::*;
use crate::entity::{EntityId, EntityKind, IdAllocator, KindMask};
use crate::navigation::attack_range;
use crate::physics::MovementIntegrator;
use crate::rng::GameRng;
use crate::spatial::SpatialIndex;
use crate::status::{DotTick, StatusEffectSpec, StatusEffectStack};
use crate::world::Unit;
use damage::{effective_damage, knockback_magnitude, roll_raw_damage};
use events::{DamageEvent, DamageType, DeathEvent, EffectEvent, EffectShape, TickEvents};
use log::{CombatLog, CombatLogEventType};
use projectiles::{fan_directions, Projectile, ProjectileHit, ProjectileSet};

fn default_one() -> f32 {
    1.0
}

fn default_volley() -> u32 {
    1
}

/// How an attack reaches its victims. Exactly one per unit type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AttackModality {
    /// Direct damage with no travel time
    Instant,
    /// `volley` projectiles fanned across `spread_degrees`
    Projectile {
        speed: f32,
        #[serde(default = "default_volley")]
        volley: u32,
        #[serde(default)]
        spread_degrees: f32,
        #[serde(default)]
        visual: Option<String>,
    },
    /// Damage everything allowed within `radius` of the attacker
    Area {
        radius: f32,
        #[serde(default = "default_one")]
        multiplier: f32,
        #[serde(default)]
        secondary_visual: Option<String>,
    },
    /// Beam or lightning link to the target
    Arc {
        #[serde(default)]
        visual: Option<String>,
        #[serde(default)]
        deals_damage: bool,
    },
}

/// Attack of a unit type, as written in the unit catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttackProfile {
    pub modality: AttackModality,
    /// Base damage per hit
    pub damage: f32,
    /// Random spread as a fraction of damage (0.1 = ±10%)
    #[serde(default)]
    pub variance: f32,
    /// Seconds between attacks
    pub cooldown: f32,
    /// Attack distance beyond both bodies' radii
    pub reach: f32,
    #[serde(default)]
    pub armor_penetration: f32,
    /// Knockback speed; falls back to twice the distance
    #[serde(default)]
    pub knockback_speed: Option<f32>,
    #[serde(default)]
    pub knockback_distance: f32,
    /// Status applied to whatever the attack hits
    #[serde(default)]
    pub status: Option<StatusEffectSpec>,
}

impl AttackProfile {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.cooldown.is_finite() && self.cooldown > 0.0) {
            return Err("attack cooldown must be positive".to_string());
        }
        if !(self.reach.is_finite() && self.reach >= 0.0) {
            return Err("attack reach must be non-negative".to_string());
        }
        match &self.modality {
            AttackModality::Projectile { speed, volley, .. } => {
                if !(speed.is_finite() && *speed > 0.0) {
                    return Err("projectile speed must be positive".to_string());
                }
                if *volley == 0 {
                    return Err("projectile volley must be at least 1".to_string());
                }
            }
            AttackModality::Area { radius, .. } => {
                if !(radius.is_finite() && *radius > 0.0) {
                    return Err("area radius must be positive".to_string());
                }
            }
            AttackModality::Instant | AttackModality::Arc { .. } => {}
        }
        Ok(())
    }

    pub fn modality_name(&self) -> &'static str {
        match self.modality {
            AttackModality::Instant => "Instant",
            AttackModality::Projectile { .. } => "Projectile",
            AttackModality::Area { .. } => "Area",
            AttackModality::Arc { .. } => "Arc",
        }
    }
}

/// Damage and side effects delivered by one hit.
#[derive(Clone, Debug, PartialEq)]
pub struct HitPayload {
    pub source: Option<EntityId>,
    /// Rolled raw damage, before the target's armor
    pub damage: f32,
    pub armor_penetration: f32,
    pub knockback_speed: Option<f32>,
    pub knockback_distance: f32,
    pub status: Option<StatusEffectSpec>,
    pub damage_type: DamageType,
}

/// What a hit did to its target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HitOutcome {
    /// Target was missing or already destroyed
    Ignored,
    Damaged { final_amount: f32 },
    Destroyed { final_amount: f32 },
}

/// Mutable view of the world combat operates on.
pub struct CombatContext<'a> {
    pub units: &'a mut BTreeMap<EntityId, Unit>,
    pub index: &'a mut SpatialIndex<EntityKind>,
    pub integrator: &'a mut MovementIntegrator,
    pub statuses: &'a mut StatusEffectStack,
    pub projectiles: &'a mut ProjectileSet,
    pub ids: &'a mut IdAllocator,
    pub rng: &'a mut GameRng,
    pub log: &'a mut CombatLog,
    pub events: &'a mut TickEvents,
}

/// Direction of a hit from `from` to `to`, or the attacker's facing when
/// the two points coincide.
pub fn hit_direction(from: Vec2, to: Vec2, facing: f32) -> Vec2 {
    (to - from).try_normalize().unwrap_or_else(|| Vec2::from_angle(facing))
}

/// Fire every attacker that is off cooldown with its target in range.
///
/// Attackers are processed in ascending id order; at most one attack per
/// attacker per call.
pub fn resolve_attacks(ctx: &mut CombatContext<'_>, dt: f32) {
    let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
    let ids: Vec<EntityId> = ctx.units.keys().copied().collect();

    for id in ids {
        let Some(unit) = ctx.units.get_mut(&id) else {
            continue;
        };
        if !unit.alive {
            continue;
        }
        unit.attack_cooldown = (unit.attack_cooldown - dt).max(0.0);
        let (Some(target), Some(profile)) = (unit.target, unit.caps.attack.as_ref()) else {
            continue;
        };
        if unit.attack_cooldown > 0.0 {
            continue;
        }
        let cooldown = profile.cooldown;
        let range = attack_range(profile.reach, unit.caps.radius, 0.0);
        let position = unit.position;

        let in_range = ctx
            .units
            .get(&target)
            .filter(|t| t.alive)
            .map(|t| t.position.distance(position) <= range + t.caps.radius)
            .unwrap_or(false);
        if !in_range {
            continue;
        }

        if fire(ctx, id, target) {
            if let Some(unit) = ctx.units.get_mut(&id) {
                unit.attack_cooldown = cooldown;
            }
        }
    }
}

/// Launch one attack from `attacker_id` at `target_id`.
///
/// Returns false when either side is missing, dead, or the attacker has no
/// attack. Range and cooldown are the caller's concern.
pub fn fire(ctx: &mut CombatContext<'_>, attacker_id: EntityId, target_id: EntityId) -> bool {
    let Some(attacker) = ctx.units.get(&attacker_id).filter(|u| u.alive) else {
        return false;
    };
    let Some(profile) = attacker.caps.attack.clone() else {
        return false;
    };
    let Some(target) = ctx.units.get(&target_id).filter(|u| u.alive) else {
        return false;
    };

    let origin = attacker.position;
    let facing = attacker.facing;
    let attacker_radius = attacker.caps.radius;
    let allowed = attacker
        .caps
        .targeting
        .as_ref()
        .map(|policy| policy.allowed)
        .unwrap_or(KindMask::NONE);
    let aim = target.position;

    let outgoing = ctx.statuses.outgoing_damage_multiplier(attacker_id);
    let flat = ctx.statuses.outgoing_flat_reduction(attacker_id);
    let roll = |rng: &mut GameRng, scale: f32, damage_type: DamageType, status: Option<StatusEffectSpec>| HitPayload {
        source: Some(attacker_id),
        damage: roll_raw_damage(profile.damage, profile.variance, outgoing, flat, rng) * scale,
        armor_penetration: profile.armor_penetration,
        knockback_speed: profile.knockback_speed,
        knockback_distance: profile.knockback_distance,
        status,
        damage_type,
    };

    match &profile.modality {
        AttackModality::Instant => {
            let payload = roll(&mut *ctx.rng, 1.0, DamageType::Direct, profile.status);
            apply_hit(ctx, target_id, payload, hit_direction(origin, aim, facing));
            ctx.events.effects.push(EffectEvent {
                shape: EffectShape::Impact,
                visual: None,
                from: origin,
                to: aim,
                radius: 0.0,
            });
        }
        AttackModality::Arc { visual, deals_damage } => {
            ctx.events.effects.push(EffectEvent {
                shape: EffectShape::Link,
                visual: visual.clone(),
                from: origin,
                to: aim,
                radius: 0.0,
            });
            if let Some(spec) = profile.status {
                if !ctx.statuses.has_effect(target_id, spec.kind) {
                    apply_status(ctx, target_id, &spec, Some(attacker_id));
                }
            }
            if *deals_damage {
                let payload = roll(&mut *ctx.rng, 1.0, DamageType::Arc, None);
                apply_hit(ctx, target_id, payload, hit_direction(origin, aim, facing));
            }
        }
        AttackModality::Area {
            radius,
            multiplier,
            secondary_visual,
        } => {
            let mut caught: Vec<EntityId> = Vec::new();
            ctx.index.for_each_in_circle(origin, *radius, |id, entry| {
                if id != attacker_id && allowed.contains(entry.payload) {
                    caught.push(id);
                }
            });
            caught.sort();

            let payload = roll(&mut *ctx.rng, *multiplier, DamageType::Area, profile.status);
            for id in caught {
                let Some(position) = ctx.units.get(&id).filter(|u| u.alive).map(|u| u.position) else {
                    continue;
                };
                apply_hit(ctx, id, payload.clone(), hit_direction(origin, position, facing));
            }

            ctx.events.effects.push(EffectEvent {
                shape: EffectShape::Burst,
                visual: None,
                from: origin,
                to: origin,
                radius: *radius,
            });
            if let Some(visual) = secondary_visual {
                ctx.events.effects.push(EffectEvent {
                    shape: EffectShape::Impact,
                    visual: Some(visual.clone()),
                    from: origin,
                    to: aim,
                    radius: 0.0,
                });
            }
        }
        AttackModality::Projectile {
            speed,
            volley,
            spread_degrees,
            visual,
        } => {
            for direction in fan_directions(aim - origin, *volley, spread_degrees.to_radians()) {
                let payload = roll(&mut *ctx.rng, 1.0, DamageType::Projectile, profile.status);
                let id = ctx.ids.next_id();
                ctx.projectiles.spawn(Projectile {
                    id,
                    position: origin + direction * attacker_radius,
                    velocity: direction * *speed,
                    radius: PROJECTILE_RADIUS,
                    remaining: PROJECTILE_LIFETIME,
                    hits: allowed,
                    payload,
                    visual: visual.clone(),
                });
            }
        }
    }

    debug!(
        "{} fires {} attack at {}",
        attacker_id,
        profile.modality_name(),
        target_id
    );
    true
}

fn apply_status(ctx: &mut CombatContext<'_>, target: EntityId, spec: &StatusEffectSpec, source: Option<EntityId>) {
    if ctx.statuses.apply_effect(target, spec.instantiate(source)) {
        ctx.log.log(
            CombatLogEventType::StatusApplied,
            format!("{} afflicted by {} ({:.1})", target, spec.kind.name(), spec.magnitude),
        );
    }
}

/// Apply one hit to `target_id`.
///
/// Damage goes through armor and the target's incoming multiplier; HP is
/// clamped to `[0, max]`. A target reaching zero is destroyed and receives no
/// knockback. A survivor gets the payload's status and a knockback impulse
/// along `direction`.
pub fn apply_hit(ctx: &mut CombatContext<'_>, target_id: EntityId, payload: HitPayload, direction: Vec2) -> HitOutcome {
    let incoming = ctx.statuses.incoming_damage_multiplier(target_id);
    let Some(target) = ctx.units.get_mut(&target_id).filter(|u| u.alive) else {
        return HitOutcome::Ignored;
    };

    let over_time_factor = if payload.damage_type == DamageType::OverTime {
        DOT_ARMOR_FACTOR
    } else {
        1.0
    };
    let final_amount = effective_damage(
        payload.damage,
        target.caps.armor,
        payload.armor_penetration,
        over_time_factor,
        incoming,
    );
    target.health = (target.health - final_amount).clamp(0.0, target.caps.max_health);
    target.damage_taken += final_amount;
    let destroyed = target.health <= 0.0;
    let body = target.body;

    if let Some(source) = payload.source.and_then(|id| ctx.units.get_mut(&id)) {
        source.damage_dealt += final_amount;
    }

    ctx.events.damage.push(DamageEvent {
        source: payload.source,
        target: target_id,
        amount: payload.damage,
        final_amount,
        damage_type: payload.damage_type,
    });
    ctx.log.log(
        CombatLogEventType::Damage,
        format!(
            "{} hits {} for {:.1} ({:?})",
            payload.source.map(|id| id.to_string()).unwrap_or_else(|| "?".to_string()),
            target_id,
            final_amount,
            payload.damage_type
        ),
    );

    if destroyed {
        destroy(ctx, target_id, payload.source);
        return HitOutcome::Destroyed { final_amount };
    }

    if let Some(spec) = payload.status {
        apply_status(ctx, target_id, &spec, payload.source);
    }

    let magnitude = knockback_magnitude(payload.knockback_speed, payload.knockback_distance);
    if magnitude > 0.0 {
        if let Some(body) = body {
            let direction = direction.try_normalize().unwrap_or(Vec2::X);
            ctx.integrator
                .apply_impulse(body, direction * magnitude, KNOCKBACK_DURATION);
        }
    }

    HitOutcome::Damaged { final_amount }
}

/// Mark an entity destroyed: it leaves the spatial index and its status
/// effects at once, so nothing later in the tick can find it. The owning
/// world finishes the cleanup from the emitted [`DeathEvent`].
pub fn destroy(ctx: &mut CombatContext<'_>, victim: EntityId, killer: Option<EntityId>) {
    let Some(unit) = ctx.units.get_mut(&victim).filter(|u| u.alive) else {
        return;
    };
    unit.alive = false;
    unit.health = 0.0;
    unit.target = None;
    let victim_kind = unit.caps.kind;
    let reward = if victim_kind == EntityKind::Hostile {
        unit.caps.reward
    } else {
        0
    };

    ctx.index.delete(victim);
    ctx.statuses.remove_target(victim);

    if let Some(killer_unit) = killer.and_then(|id| ctx.units.get_mut(&id)) {
        killer_unit.kills += 1;
    }

    ctx.log.log(
        CombatLogEventType::Death,
        format!("{} {} destroyed", victim_kind.name(), victim),
    );
    ctx.events.deaths.push(DeathEvent {
        victim,
        victim_kind,
        killer,
        reward,
    });
}

/// Land projectile impacts collected during flight.
pub fn resolve_projectile_hits(ctx: &mut CombatContext<'_>, hits: Vec<ProjectileHit>) {
    for hit in hits {
        ctx.events.effects.push(EffectEvent {
            shape: EffectShape::Impact,
            visual: hit.visual.clone(),
            from: hit.position,
            to: hit.position,
            radius: 0.0,
        });
        apply_hit(ctx, hit.target, hit.payload, hit.direction);
    }
}

/// Apply damage-over-time ticks. Over-time damage only half-counts armor
/// and never knocks back.
pub fn apply_damage_over_time(ctx: &mut CombatContext<'_>, ticks: &[DotTick]) {
    for tick in ticks {
        let payload = HitPayload {
            source: tick.source,
            damage: tick.damage,
            armor_penetration: 0.0,
            knockback_speed: None,
            knockback_distance: 0.0,
            status: None,
            damage_type: DamageType::OverTime,
        };
        apply_hit(ctx, tick.target, payload, Vec2::ZERO);
    }
}
