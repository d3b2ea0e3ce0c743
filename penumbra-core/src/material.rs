/// Per-mesh material table
use std::path::{Path, PathBuf};

/// Surface description parsed from a material library.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub diffuse: [f32; 3],
    /// Opacity in [0, 1]. Anything below 1.0 is drawn in the transparent layer.
    pub dissolve: f32,
    pub diffuse_texture: Option<PathBuf>,
}

impl Material {
    pub fn new(name: impl Into<String>, diffuse: [f32; 3], dissolve: f32) -> Self {
        Self {
            name: name.into(),
            diffuse,
            dissolve: dissolve.clamp(0.0, 1.0),
            diffuse_texture: None,
        }
    }

    pub fn with_texture(mut self, path: impl Into<PathBuf>) -> Self {
        self.diffuse_texture = Some(path.into());
        self
    }

    /// Convert a parsed MTL entry, resolving its diffuse map against `search_dir`.
    pub fn from_tobj(material: &tobj::Material, search_dir: &Path) -> Self {
        let diffuse_texture = material
            .diffuse_texture
            .as_deref()
            .filter(|name| !name.is_empty())
            .map(|name| search_dir.join(name));

        Self {
            name: material.name.clone(),
            diffuse: material.diffuse.unwrap_or([0.0; 3]),
            dissolve: material.dissolve.unwrap_or(1.0).clamp(0.0, 1.0),
            diffuse_texture,
        }
    }

    pub fn is_transparent(&self) -> bool {
        self.dissolve < 1.0
    }

    pub fn has_texture(&self) -> bool {
        self.diffuse_texture.is_some()
    }

    /// Vertex colour a face with this material is baked with.
    pub fn vertex_colour(&self) -> [f32; 4] {
        if self.has_texture() {
            [1.0, 1.0, 1.0, self.dissolve]
        } else {
            [self.diffuse[0], self.diffuse[1], self.diffuse[2], self.dissolve]
        }
    }
}

/// Materials of one mesh, indexed by the per-face material id. The
/// transparency of each entry is classified once on construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialTable {
    materials: Vec<Material>,
    transparent: Vec<bool>,
}

impl MaterialTable {
    pub fn new(materials: Vec<Material>) -> Self {
        let transparent = materials.iter().map(Material::is_transparent).collect();
        Self {
            materials,
            transparent,
        }
    }

    pub fn get(&self, index: usize) -> Option<&Material> {
        self.materials.get(index)
    }

    /// Faces without a material, or with an unknown one, count as opaque.
    pub fn is_transparent(&self, index: Option<usize>) -> bool {
        index
            .and_then(|index| self.transparent.get(index))
            .copied()
            .unwrap_or(false)
    }

    pub fn has_transparency(&self) -> bool {
        self.transparent.iter().any(|&transparent| transparent)
    }

    /// Colour for a vertex of a face using `index`.
    pub fn vertex_colour(&self, index: Option<usize>) -> [f32; 4] {
        index
            .and_then(|index| self.get(index))
            .map(Material::vertex_colour)
            .unwrap_or([1.0, 1.0, 1.0, 1.0])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Material> {
        self.materials.iter()
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparency_classification() {
        let table = MaterialTable::new(vec![
            Material::new("solid", [1.0, 0.0, 0.0], 1.0),
            Material::new("glass", [0.0, 0.0, 1.0], 0.4),
        ]);

        assert!(!table.is_transparent(Some(0)));
        assert!(table.is_transparent(Some(1)));
        assert!(!table.is_transparent(None));
        assert!(!table.is_transparent(Some(7)));
        assert!(table.has_transparency());
    }

    #[test]
    fn test_vertex_colour_rules() {
        let table = MaterialTable::new(vec![
            Material::new("plain", [0.2, 0.4, 0.6], 0.5),
            Material::new("painted", [0.2, 0.4, 0.6], 0.5).with_texture("paint.png"),
        ]);

        assert_eq!(table.vertex_colour(Some(0)), [0.2, 0.4, 0.6, 0.5]);
        assert_eq!(table.vertex_colour(Some(1)), [1.0, 1.0, 1.0, 0.5]);
        assert_eq!(table.vertex_colour(None), [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_from_tobj_defaults() {
        let parsed = tobj::Material {
            name: "bare".to_string(),
            diffuse_texture: Some(String::new()),
            ..Default::default()
        };
        let material = Material::from_tobj(&parsed, Path::new("assets"));

        assert_eq!(material.diffuse, [0.0, 0.0, 0.0]);
        assert_eq!(material.dissolve, 1.0);
        assert!(!material.has_texture());

        let textured = tobj::Material {
            name: "wood".to_string(),
            diffuse_texture: Some("wood.png".to_string()),
            dissolve: Some(0.25),
            ..Default::default()
        };
        let material = Material::from_tobj(&textured, Path::new("assets"));
        assert_eq!(material.diffuse_texture, Some(PathBuf::from("assets").join("wood.png")));
        assert!(material.is_transparent());
    }
}
