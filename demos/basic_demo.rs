//! Basic demonstration of the Arcfire simulation.
//!
//! Run with: RUST_LOG=debug cargo run --example basic_demo

use arcfire_sim::visual::VisualFuture;
use arcfire_sim::{
    ActorId, ConfigStore, DebugOverlay, Faction, GameRunner, MapConfig, SimWorld, VisualFactory,
    VisualId, VisualManager, VisualRequest, VisualTransform,
};
use glam::Vec3;
use std::collections::HashMap;

const LEVELS: &str = r#"{
    "1": {
        "id": 1,
        "name": "ridge",
        "mapId": 7,
        "actors": [
            { "id": 1, "modelId": "archer", "faction": 1, "position": { "x": 0, "y": 0, "z": 0 } },
            { "id": 2, "modelId": "ogre", "faction": 2, "position": { "x": 18, "y": 0, "z": 6 } },
            { "id": 3, "kind": "building", "modelId": "tower", "faction": 2, "position": { "x": 25, "y": 0, "z": -4 } }
        ]
    }
}"#;

const MAPS: &str = r#"{ "7": { "id": 7, "name": "ridge", "width": 40, "height": 20, "blockedCells": [12, 13] } }"#;

const BULLETS: &str = r#"{
    "100": {
        "id": 100,
        "name": "homing arrow",
        "modelId": "fx_arrow",
        "segments": [{
            "id": 1,
            "triggers": [
                { "eventType": "bulletStart",
                  "actions": [{ "type": "bulletFlyToTarget",
                                "params": { "targetActorNo": 2, "speed": 14, "arc": 3, "homing": true, "homingRate": 240, "collisionRadius": 0.5 } }] },
                { "eventType": "bulletHit",
                  "actions": [{ "type": "bulletDamage", "params": { "damageValue": 40, "damageRatio": 1.25 } }] }
            ]
        }]
    }
}"#;

/// Resolves every load immediately.
struct InstantFactory;

impl VisualFactory for InstantFactory {
    type Visual = String;

    fn load(&mut self, request: &VisualRequest) -> VisualFuture<String> {
        Box::pin(std::future::ready(Ok(format!("{}#{}", request.model_id, request.actor.0))))
    }
}

#[derive(Default)]
struct ConsoleStage {
    visuals: HashMap<VisualId, String>,
    last: HashMap<VisualId, VisualTransform>,
}

impl VisualManager for ConsoleStage {
    type Visual = String;

    fn add(&mut self, id: VisualId, visual: String) {
        println!("  + {} ({})", id.0, visual);
        self.visuals.insert(id, visual);
    }

    fn remove(&mut self, id: &VisualId) -> bool {
        println!("  - {}", id.0);
        self.last.remove(id);
        self.visuals.remove(id).is_some()
    }

    fn contains(&self, id: &VisualId) -> bool {
        self.visuals.contains_key(id)
    }

    fn apply(&mut self, id: &VisualId, transform: &VisualTransform) {
        self.last.insert(id.clone(), *transform);
    }

    fn debug_overlay(&mut self, overlay: &DebugOverlay, map: Option<&MapConfig>) {
        if let Some(map) = map {
            println!("  overlay {:?} on {} ({} blocked cells)", overlay, map.name, map.blocked_cells.len());
        }
    }
}

fn main() {
    env_logger::init();
    println!("=== Arcfire - Simulation Demo ===\n");

    let mut configs = ConfigStore::new();
    configs.load_levels_json(LEVELS).expect("levels");
    configs.load_maps_json(MAPS).expect("maps");
    configs.load_bullets_json(BULLETS).expect("bullets");

    let mut runner = GameRunner::new(SimWorld::new(), configs, InstantFactory, ConsoleStage::default());
    runner.load_level(1, None).expect("level 1");
    runner.set_show_blocked_cells(true);

    // 60 Hz display, arrow fired after the first frame.
    let mut now = 0.0;
    runner.frame(now);
    runner
        .fire_bullet(ActorId(100), 100, Faction(1), Vec3::new(0.0, 1.0, 0.0))
        .expect("fire");

    for frame in 1..=180 {
        now += 1.0 / 60.0;
        runner.frame(now);

        for event in runner.sim_mut().drain_events() {
            println!("[frame {:3}] {:?}", frame, event);
        }
        if frame % 20 == 0 {
            if let Some(arrow) = runner.visuals().last.get(&VisualId::for_actor(ActorId(100))) {
                println!(
                    "[frame {:3}] arrow at ({:.2}, {:.2}, {:.2}) facing {:.0}°",
                    frame, arrow.position.x, arrow.position.y, arrow.position.z, arrow.rotation
                );
            }
        }
    }

    println!("\n=== Final State (JSON) ===\n");
    println!("{}", runner.sim_mut().snapshot().to_json_pretty().unwrap_or_default());
}
