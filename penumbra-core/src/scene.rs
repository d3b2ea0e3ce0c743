/// Scene registry with typed handles and a fixed draw order
use std::sync::atomic::{AtomicU64, Ordering};

use crate::camera::Camera;
use crate::light::Light;
use crate::model::Model;

static NEXT_SCENE: AtomicU64 = AtomicU64::new(1);

/// Handle returned when an object is registered. Only resolves in the scene
/// that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId {
    scene: u64,
    index: usize,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SceneError {
    #[error("No scene object named \"{0}\"")]
    UnknownName(String),
    #[error("No scene object with handle {0:?}")]
    UnknownObject(ObjectId),
    #[error("A scene object named \"{0}\" already exists")]
    DuplicateName(String),
}

#[derive(Debug)]
struct Entry {
    name: String,
    model: Model,
}

/// Every object in the scene. The draw order is fixed at registration:
/// objects without transparent materials first, then those with them, each
/// group in registration order. Both passes enumerate the scene this way.
#[derive(Debug)]
pub struct Scene {
    id: u64,
    entries: Vec<Entry>,
    draw_order: Vec<ObjectId>,
    opaque_count: usize,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            id: NEXT_SCENE.fetch_add(1, Ordering::Relaxed),
            entries: Vec::new(),
            draw_order: Vec::new(),
            opaque_count: 0,
        }
    }

    fn handle(&self, index: usize) -> ObjectId {
        ObjectId { scene: self.id, index }
    }

    fn index(&self, id: ObjectId) -> Result<usize, SceneError> {
        if id.scene == self.id && id.index < self.entries.len() {
            Ok(id.index)
        } else {
            Err(SceneError::UnknownObject(id))
        }
    }

    pub fn add(&mut self, name: impl Into<String>, model: Model) -> Result<ObjectId, SceneError> {
        let name = name.into();
        if self.entries.iter().any(|entry| entry.name == name) {
            return Err(SceneError::DuplicateName(name));
        }

        let id = self.handle(self.entries.len());
        if model.has_transparency() {
            self.draw_order.push(id);
        } else {
            self.draw_order.insert(self.opaque_count, id);
            self.opaque_count += 1;
        }

        log::debug!("registered scene object \"{}\" as {:?}", name, id);
        self.entries.push(Entry { name, model });
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Result<ObjectId, SceneError> {
        self.entries
            .iter()
            .position(|entry| entry.name == name)
            .map(|index| self.handle(index))
            .ok_or_else(|| SceneError::UnknownName(name.to_string()))
    }

    pub fn get(&self, id: ObjectId) -> Result<&Model, SceneError> {
        let index = self.index(id)?;
        Ok(&self.entries[index].model)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Result<&mut Model, SceneError> {
        let index = self.index(id)?;
        Ok(&mut self.entries[index].model)
    }

    pub fn name(&self, id: ObjectId) -> Result<&str, SceneError> {
        let index = self.index(id)?;
        Ok(&self.entries[index].name)
    }

    pub fn draw_order(&self) -> &[ObjectId] {
        &self.draw_order
    }

    /// Models in draw order.
    pub fn models(&self) -> impl Iterator<Item = &Model> + '_ {
        self.draw_order.iter().map(move |id| &self.entries[id.index].model)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-frame view state shared by both passes.
#[derive(Debug, Clone)]
pub struct SceneContext {
    pub camera: Camera,
    pub light: Light,
}

impl SceneContext {
    pub fn new(camera: Camera, light: Light) -> Self {
        Self { camera, light }
    }
}
