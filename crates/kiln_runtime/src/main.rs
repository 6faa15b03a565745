//! Kiln Engine Runtime
//!
//! Boots the engine services and runs a short entity churn workload over
//! the pooled component storage.

use anyhow::{Context, Result};
use kiln_core::ecs::World;
use kiln_services::Settings;
use tracing_subscriber::EnvFilter;

const SETTINGS_PATH: &str = "kiln.json";

#[derive(Debug, Clone, Copy)]
struct Transform {
    position: [f32; 3],
    velocity: [f32; 3],
}

#[derive(Debug, Clone, Copy)]
struct Health {
    current: u32,
    max: u32,
}

fn main() -> Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| SETTINGS_PATH.to_string());
    let settings = Settings::load_or_default(&path)
        .with_context(|| format!("loading settings from {path}"))?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&settings.log_filter))
        .init();

    tracing::info!("Kiln Engine v{}", kiln_core::VERSION);

    let mut world = World::with_config(settings.memory.clone());
    run_churn(&mut world, 8, 256)?;

    for (name, stats) in [
        ("Transform", world.pool_stats::<Transform>()),
        ("Health", world.pool_stats::<Health>()),
    ] {
        if let Some(stats) = stats {
            tracing::info!(
                component = name,
                blocks = stats.blocks,
                live = stats.live_objects(),
                free = stats.free_slots(),
                reserved_bytes = stats.reserved_bytes,
                "pool summary"
            );
        }
    }
    for (name, value) in world.counters().iter() {
        tracing::info!(counter = name, value);
    }

    Ok(())
}

/// Spawn and despawn waves of entities, the way a frame loop would.
fn run_churn(world: &mut World, frames: usize, per_frame: usize) -> Result<()> {
    let mut live = Vec::new();
    for frame in 0..frames {
        for i in 0..per_frame {
            let entity = world.spawn();
            let t = (frame * per_frame + i) as f32;
            world.insert(
                entity,
                Transform {
                    position: [t, 0.0, 0.0],
                    velocity: [1.0, 0.0, 0.0],
                },
            )?;
            if i % 2 == 0 {
                world.insert(entity, Health { current: 100, max: 100 })?;
            }
            live.push(entity);
        }

        for &entity in &live {
            if let Some(transform) = world.get_mut::<Transform>(entity) {
                for axis in 0..3 {
                    transform.position[axis] += transform.velocity[axis];
                }
            }
            if let Some(health) = world.get_mut::<Health>(entity) {
                health.current = health.current.saturating_sub(1).min(health.max);
            }
        }

        // Retire the oldest half so later frames reuse freed slots.
        let retire = live.len() / 2;
        for entity in live.drain(..retire) {
            world.despawn(entity);
        }
        tracing::debug!(frame, entities = world.entity_count(), "frame complete");
    }
    Ok(())
}
