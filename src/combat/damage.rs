//! Damage math
//!
//! Pure functions shared by every attack modality and by damage-over-time.

use crate::rng::GameRng;

/// Armor left after penetration, scaled for over-time damage.
pub fn effective_armor(armor: f32, armor_penetration: f32, over_time_factor: f32) -> f32 {
    (sanitize(armor) - sanitize(armor_penetration)).max(0.0) * sanitize(over_time_factor)
}

/// Final damage after armor and the target's incoming multiplier.
///
/// The incoming multiplier never reduces damage below the armored value.
pub fn effective_damage(
    raw_damage: f32,
    armor: f32,
    armor_penetration: f32,
    over_time_factor: f32,
    incoming_multiplier: f32,
) -> f32 {
    let armor = effective_armor(armor, armor_penetration, over_time_factor);
    let incoming = if incoming_multiplier.is_finite() {
        incoming_multiplier.max(1.0)
    } else {
        1.0
    };
    (sanitize(raw_damage) - armor).max(0.0) * incoming
}

/// Roll the raw damage of one attack.
///
/// `variance` is a fraction: 0.1 gives ±10%. The attacker's outgoing
/// multiplier scales the roll, then its flat reduction is subtracted.
pub fn roll_raw_damage(
    base: f32,
    variance: f32,
    outgoing_multiplier: f32,
    outgoing_flat_reduction: f32,
    rng: &mut GameRng,
) -> f32 {
    let variance = sanitize(variance).min(1.0);
    let spread = if variance > 0.0 {
        rng.random_range(-variance, variance)
    } else {
        0.0
    };
    let multiplier = if outgoing_multiplier.is_finite() {
        outgoing_multiplier.max(0.0)
    } else {
        1.0
    };
    (sanitize(base) * (1.0 + spread) * multiplier - sanitize(outgoing_flat_reduction)).max(0.0)
}

/// Speed of the knockback impulse a surviving target receives.
///
/// Twice the configured distance is the floor, so a target always travels
/// at least that far over the linear decay.
pub fn knockback_magnitude(knockback_speed: Option<f32>, knockback_distance: f32) -> f32 {
    let from_distance = sanitize(knockback_distance) * 2.0;
    knockback_speed.map(sanitize).unwrap_or(0.0).max(from_distance)
}

fn sanitize(value: f32) -> f32 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_armor_and_penetration() {
        assert_eq!(effective_damage(50.0, 20.0, 5.0, 1.0, 1.0), 35.0);
    }

    #[test]
    fn test_penetration_beyond_armor_is_wasted() {
        assert_eq!(effective_damage(50.0, 5.0, 20.0, 1.0, 1.0), 50.0);
    }

    #[test]
    fn test_over_time_halves_armor() {
        assert_eq!(effective_damage(10.0, 8.0, 0.0, 0.5, 1.0), 6.0);
    }

    #[test]
    fn test_incoming_multiplier_floor() {
        assert_eq!(effective_damage(10.0, 0.0, 0.0, 1.0, 0.5), 10.0);
        assert_eq!(effective_damage(10.0, 0.0, 0.0, 1.0, 1.5), 15.0);
        assert_eq!(effective_damage(10.0, 0.0, 0.0, 1.0, f32::NAN), 10.0);
    }

    #[test]
    fn test_armor_never_heals() {
        assert_eq!(effective_damage(5.0, 50.0, 0.0, 1.0, 2.0), 0.0);
    }

    #[test]
    fn test_knockback_magnitude() {
        assert_eq!(knockback_magnitude(None, 10.0), 20.0);
        assert_eq!(knockback_magnitude(Some(50.0), 10.0), 50.0);
        assert_eq!(knockback_magnitude(Some(5.0), 10.0), 20.0);
        assert_eq!(knockback_magnitude(None, 0.0), 0.0);
    }

    #[test]
    fn test_roll_without_variance_is_exact() {
        let mut rng = GameRng::from_seed(1);
        assert_eq!(roll_raw_damage(20.0, 0.0, 0.5, 2.0, &mut rng), 8.0);
        assert_eq!(roll_raw_damage(20.0, 0.0, 1.0, 50.0, &mut rng), 0.0);
    }

    #[test]
    fn test_roll_stays_within_variance() {
        let mut rng = GameRng::from_seed(42);
        for _ in 0..100 {
            let roll = roll_raw_damage(100.0, 0.2, 1.0, 0.0, &mut rng);
            assert!((80.0..=120.0).contains(&roll));
        }
    }
}
