//! Data configs consumed by the kernel.
//!
//! Bullet configs follow the shape `config → segments → triggers →
//! conditions / actions`. Condition and action entries are kept raw
//! (`type` tag + JSON params) here; [`crate::trigger`] decodes them.
//! Keys are camelCase to match the authoring tables.

use crate::components::{ActorId, ActorKind, Faction};
use crate::error::ConfigError;
use crate::flight::ArcSampling;
use glam::Vec3;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// `{x, y, z?}` point as written in config tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl From<Point3> for Vec3 {
    fn from(p: Point3) -> Self {
        Vec3::new(p.x, p.y, p.z)
    }
}

impl From<Vec3> for Point3 {
    fn from(v: Vec3) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }
}

// ============================================================================
// BULLET CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulletConfig {
    pub id: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub model_id: String,
    #[serde(default)]
    pub segments: Vec<SegmentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentConfig {
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
    /// Older tables put conditions on the segment; used when a trigger has none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<ConditionConfig>>,
    /// Older tables put actions on the segment; used when a trigger has none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<ActionConfig>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfig {
    pub event_type: TriggerEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<ConditionConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<ActionConfig>>,
}

/// Raw condition entry: a type tag and its params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Value,
}

/// Raw action entry: a type tag and its params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Value,
}

impl ConditionConfig {
    pub fn new(kind: impl Into<String>, params: Value) -> Self {
        Self { kind: kind.into(), params }
    }
}

impl ActionConfig {
    pub fn new(kind: impl Into<String>, params: Value) -> Self {
        Self { kind: kind.into(), params }
    }
}

/// Runtime event a trigger listens for.
///
/// Unknown event names survive decoding as `Other` and never match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TriggerEvent {
    BulletStart,
    BulletEnd,
    BulletHit,
    Other(String),
}

impl TriggerEvent {
    pub fn as_str(&self) -> &str {
        match self {
            TriggerEvent::BulletStart => "bulletStart",
            TriggerEvent::BulletEnd => "bulletEnd",
            TriggerEvent::BulletHit => "bulletHit",
            TriggerEvent::Other(name) => name,
        }
    }
}

impl From<String> for TriggerEvent {
    fn from(name: String) -> Self {
        match name.as_str() {
            "bulletStart" => TriggerEvent::BulletStart,
            "bulletEnd" => TriggerEvent::BulletEnd,
            "bulletHit" => TriggerEvent::BulletHit,
            _ => TriggerEvent::Other(name),
        }
    }
}

impl From<TriggerEvent> for String {
    fn from(event: TriggerEvent) -> Self {
        event.as_str().to_string()
    }
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CONDITION / ACTION PARAMS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifetimeParams {
    pub lifetime_sec: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistanceLessParams {
    #[serde(default, alias = "targetActorNo")]
    pub target_unit: Option<ActorId>,
    #[serde(default)]
    pub target_position: Option<Point3>,
    pub max_distance: f32,
}

/// Params of a `custom` condition or action, dispatched by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomParams {
    #[serde(alias = "conditionName", alias = "actionName")]
    pub name: String,
    #[serde(default)]
    pub params: Value,
}

fn default_speed() -> f32 {
    5.0
}

fn default_homing_rate() -> f32 {
    180.0
}

fn default_collision_radius() -> f32 {
    0.1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlyToTargetParams {
    #[serde(default, alias = "targetActorNo")]
    pub target_unit: Option<ActorId>,
    #[serde(default)]
    pub target_position: Option<Point3>,
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default)]
    pub acceleration: f32,
    #[serde(default)]
    pub max_speed: Option<f32>,
    #[serde(default)]
    pub arc: f32,
    #[serde(default)]
    pub homing: bool,
    /// Degrees per second.
    #[serde(default = "default_homing_rate")]
    pub homing_rate: f32,
    #[serde(default = "default_collision_radius")]
    pub collision_radius: f32,
    #[serde(default = "default_true")]
    pub stop_on_hit: bool,
    #[serde(default)]
    pub arc_sampling: ArcSampling,
}

impl Default for FlyToTargetParams {
    fn default() -> Self {
        Self {
            target_unit: None,
            target_position: None,
            speed: default_speed(),
            acceleration: 0.0,
            max_speed: None,
            arc: 0.0,
            homing: false,
            homing_rate: default_homing_rate(),
            collision_radius: default_collision_radius(),
            stop_on_hit: true,
            arc_sampling: ArcSampling::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DamageTriggerType {
    Target,
    Range,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DamageParams {
    pub damage_value: Option<f32>,
    pub damage_key: Option<String>,
    pub damage_ratio: Option<f32>,
    pub damage_ratio_key: Option<String>,
    pub trigger_type: Option<DamageTriggerType>,
    pub max_distance_value: Option<f32>,
    pub radius: Option<f32>,
}

// ============================================================================
// LEVEL / MAP CONFIG
// ============================================================================

fn default_scale() -> f32 {
    1.0
}

fn default_kind() -> ActorKind {
    ActorKind::Unit
}

/// An actor placed by a level at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorSpawn {
    pub id: ActorId,
    #[serde(default = "default_kind")]
    pub kind: ActorKind,
    pub model_id: String,
    #[serde(default)]
    pub config_id: u32,
    #[serde(default)]
    pub faction: Faction,
    #[serde(default)]
    pub position: Point3,
    #[serde(default)]
    pub rotation: f32,
    #[serde(default = "default_scale")]
    pub scale: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelConfig {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    pub map_id: u32,
    #[serde(default)]
    pub actors: Vec<ActorSpawn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapConfig {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
    /// Grid cell indices that block movement (debug overlay only).
    #[serde(default)]
    pub blocked_cells: Vec<u32>,
    /// Grid cell indices that accept buildings (debug overlay only).
    #[serde(default)]
    pub build_cells: Vec<u32>,
}

// ============================================================================
// CONFIG TABLES
// ============================================================================

/// Keyed config tables supplied by the host game.
pub trait ConfigTable {
    fn bullet(&self, id: u32) -> Option<Arc<BulletConfig>>;
    fn level(&self, id: u32) -> Option<Arc<LevelConfig>>;
    fn map(&self, id: u32) -> Option<Arc<MapConfig>>;
}

trait Keyed {
    fn key(&self) -> u32;
}

impl Keyed for BulletConfig {
    fn key(&self) -> u32 {
        self.id
    }
}

impl Keyed for LevelConfig {
    fn key(&self) -> u32 {
        self.id
    }
}

impl Keyed for MapConfig {
    fn key(&self) -> u32 {
        self.id
    }
}

/// Parse a JSON object keyed by id (`{"1001": {...}, ...}`).
fn parse_table<T: DeserializeOwned + Keyed>(json: &str) -> Result<Vec<(u32, T)>, ConfigError> {
    let raw: HashMap<String, T> = serde_json::from_str(json)?;
    let mut rows = Vec::with_capacity(raw.len());
    for (key, row) in raw {
        let id: u32 = key.parse().map_err(|_| ConfigError::BadKey { key: key.clone() })?;
        if row.key() != id {
            return Err(ConfigError::IdMismatch { key: id, declared: row.key() });
        }
        rows.push((id, row));
    }
    Ok(rows)
}

/// In-memory config tables.
#[derive(Debug, Default, Clone)]
pub struct ConfigStore {
    bullets: HashMap<u32, Arc<BulletConfig>>,
    levels: HashMap<u32, Arc<LevelConfig>>,
    maps: HashMap<u32, Arc<MapConfig>>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_bullet(&mut self, config: BulletConfig) {
        self.bullets.insert(config.id, Arc::new(config));
    }

    pub fn insert_level(&mut self, config: LevelConfig) {
        self.levels.insert(config.id, Arc::new(config));
    }

    pub fn insert_map(&mut self, config: MapConfig) {
        self.maps.insert(config.id, Arc::new(config));
    }

    /// Load a keyed bullet table. Returns the number of rows added.
    pub fn load_bullets_json(&mut self, json: &str) -> Result<usize, ConfigError> {
        let rows = parse_table::<BulletConfig>(json)?;
        let count = rows.len();
        self.bullets.extend(rows.into_iter().map(|(id, c)| (id, Arc::new(c))));
        Ok(count)
    }

    pub fn load_levels_json(&mut self, json: &str) -> Result<usize, ConfigError> {
        let rows = parse_table::<LevelConfig>(json)?;
        let count = rows.len();
        self.levels.extend(rows.into_iter().map(|(id, c)| (id, Arc::new(c))));
        Ok(count)
    }

    pub fn load_maps_json(&mut self, json: &str) -> Result<usize, ConfigError> {
        let rows = parse_table::<MapConfig>(json)?;
        let count = rows.len();
        self.maps.extend(rows.into_iter().map(|(id, c)| (id, Arc::new(c))));
        Ok(count)
    }
}

impl ConfigTable for ConfigStore {
    fn bullet(&self, id: u32) -> Option<Arc<BulletConfig>> {
        self.bullets.get(&id).cloned()
    }

    fn level(&self, id: u32) -> Option<Arc<LevelConfig>> {
        self.levels.get(&id).cloned()
    }

    fn map(&self, id: u32) -> Option<Arc<MapConfig>> {
        self.maps.get(&id).cloned()
    }
}
