//! Two-phase material map.
//!
//! Reading registers one recipe per `MAT` line. [`MaterialMap::build_all`]
//! then constructs every material in ascending id order, so all ranks hold
//! identical materials before any element asks for one.

use super::definitions::{MaterialKind, find_definition};
use crate::deck_error::DeckError;
use crate::io::line_definition::InputParameterContainer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Parsed but not yet constructed material.
#[derive(Clone, Debug)]
pub struct MaterialRecipe {
    pub id: i32,
    pub kind: MaterialKind,
    pub params: InputParameterContainer,
}

impl MaterialRecipe {
    /// Identify a full `MAT <id> <NAME> ...` line.
    pub fn from_line(line: &str) -> Result<Self, DeckError> {
        let mut tokens = line.split_whitespace();
        let (Some("MAT"), Some(id), Some(name)) = (tokens.next(), tokens.next(), tokens.next()) else {
            return Err(DeckError::MalformedMaterial(line.to_string()));
        };
        let id: i32 = id
            .parse()
            .map_err(|_| DeckError::MalformedMaterial(line.to_string()))?;
        let def = find_definition(name).ok_or_else(|| DeckError::UnknownMaterial {
            id,
            name: name.to_string(),
        })?;
        Ok(Self {
            id,
            kind: def.kind,
            params: def.line.read(line)?,
        })
    }
}

/// Input of a multiscale material.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MicroScale {
    pub micro_file: PathBuf,
    /// Problem slot of the micro problem.
    pub microdis_num: usize,
}

/// Kind-specific data resolved at construction.
#[derive(Clone, Debug, PartialEq)]
pub enum MaterialData {
    Plain,
    Multiscale(MicroScale),
    /// `MAT_elchmat`: phase material ids.
    ElchMat { phase_ids: Vec<i32> },
    /// `MAT_elchphase` and `MAT_ElastHyper`: member material ids.
    Collection { mat_ids: Vec<i32> },
}

/// Constructed material.
#[derive(Clone, Debug)]
pub struct Material {
    pub id: i32,
    pub kind: MaterialKind,
    pub params: InputParameterContainer,
    pub data: MaterialData,
}

impl Material {
    pub fn micro_scale(&self) -> Option<&MicroScale> {
        match &self.data {
            MaterialData::Multiscale(m) => Some(m),
            _ => None,
        }
    }

    pub fn phase_ids(&self) -> &[i32] {
        match &self.data {
            MaterialData::ElchMat { phase_ids } => phase_ids,
            _ => &[],
        }
    }

    pub fn mat_ids(&self) -> &[i32] {
        match &self.data {
            MaterialData::Collection { mat_ids } => mat_ids,
            _ => &[],
        }
    }
}

/// Materials of one problem, by id.
#[derive(Clone, Debug, Default)]
pub struct MaterialMap {
    recipes: BTreeMap<i32, MaterialRecipe>,
    built: BTreeMap<i32, Material>,
}

impl MaterialMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase 1: register a recipe. Ids are unique.
    pub fn register(&mut self, recipe: MaterialRecipe) -> Result<(), DeckError> {
        if self.recipes.contains_key(&recipe.id) {
            return Err(DeckError::DuplicateMaterial(recipe.id));
        }
        self.recipes.insert(recipe.id, recipe);
        Ok(())
    }

    /// Phase 2: construct every registered material, lowest id first.
    pub fn build_all(&mut self) -> Result<(), DeckError> {
        let mut built = BTreeMap::new();
        for (&id, recipe) in &self.recipes {
            let data = self.construct(recipe)?;
            built.insert(
                id,
                Material {
                    id,
                    kind: recipe.kind,
                    params: recipe.params.clone(),
                    data,
                },
            );
        }
        self.built = built;
        Ok(())
    }

    fn construct(&self, recipe: &MaterialRecipe) -> Result<MaterialData, DeckError> {
        let p = &recipe.params;
        Ok(match recipe.kind {
            MaterialKind::StructMultiscale
            | MaterialKind::ScatraMultiscale
            | MaterialKind::NewmanMultiscale => {
                let microdis_num: i64 = p.get("MICRODIS_NUM")?;
                let microdis_num = usize::try_from(microdis_num).map_err(|_| DeckError::InvalidParameter {
                    key: "MICRODIS_NUM".into(),
                    value: microdis_num.to_string(),
                    expected: "non-negative problem slot",
                })?;
                MaterialData::Multiscale(MicroScale {
                    micro_file: PathBuf::from(p.get::<String>("MICROFILE")?),
                    microdis_num,
                })
            }
            MaterialKind::ElchMat => MaterialData::ElchMat {
                phase_ids: self.resolve(recipe, "PHASEIDS")?,
            },
            MaterialKind::ElchPhase | MaterialKind::ElastHyper => MaterialData::Collection {
                mat_ids: self.resolve(recipe, "MATIDS")?,
            },
            _ => MaterialData::Plain,
        })
    }

    fn resolve(&self, recipe: &MaterialRecipe, key: &str) -> Result<Vec<i32>, DeckError> {
        let ids: Vec<i32> = recipe.params.get(key)?;
        for &id in &ids {
            if !self.recipes.contains_key(&id) {
                return Err(DeckError::UnknownMaterial {
                    id,
                    name: format!("{key} of MAT {}", recipe.id),
                });
            }
        }
        Ok(ids)
    }

    pub fn get(&self, id: i32) -> Option<&Material> {
        self.built.get(&id)
    }

    /// Like [`get`](Self::get), failing with [`DeckError::UnknownMaterial`].
    pub fn require(&self, id: i32) -> Result<&Material, DeckError> {
        self.get(id).ok_or_else(|| DeckError::UnknownMaterial {
            id,
            name: "<undefined>".into(),
        })
    }

    pub fn ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.built.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.built.len()
    }

    pub fn is_empty(&self) -> bool {
        self.built.is_empty()
    }

    /// Lowest id of a material of `kind`.
    pub fn first_id_by_type(&self, kind: MaterialKind) -> Option<i32> {
        self.built.values().find(|m| m.kind == kind).map(|m| m.id)
    }

    /// Unwrap `MAT_elchmat` to the first material of its first phase; other
    /// materials are returned as they are.
    pub fn effective(&self, id: i32) -> Result<&Material, DeckError> {
        let mat = self.require(id)?;
        if mat.kind != MaterialKind::ElchMat {
            return Ok(mat);
        }
        let phase_id = *mat.phase_ids().first().ok_or_else(|| DeckError::UnknownMaterial {
            id,
            name: "MAT_elchmat without phases".into(),
        })?;
        let phase = self.require(phase_id)?;
        let inner = *phase.mat_ids().first().ok_or_else(|| DeckError::UnknownMaterial {
            id: phase_id,
            name: "MAT_elchphase without materials".into(),
        })?;
        self.require(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(lines: &[&str]) -> Result<MaterialMap, DeckError> {
        let mut m = MaterialMap::new();
        for l in lines {
            m.register(MaterialRecipe::from_line(l)?)?;
        }
        m.build_all()?;
        Ok(m)
    }

    #[test]
    fn wrappers_resolve_regardless_of_line_order() {
        let m = map(&[
            "MAT 1 MAT_elchmat NUMDOF 2 NUMSCAL 1 NUMPHASE 1 PHASEIDS 2",
            "MAT 3 MAT_newman_multiscale MICROFILE micro.dat MICRODIS_NUM 1 VALENCE 1.0 ELECTRONIC_COND 10.0",
            "MAT 2 MAT_elchphase EPSILON 1.0 TORTUOSITY 1.0 NUMMAT 1 MATIDS 3",
        ])
        .expect("materials");
        assert_eq!(m.ids().collect::<Vec<_>>(), vec![1, 2, 3]);
        let inner = m.effective(1).expect("unwrap");
        assert_eq!(inner.id, 3);
        assert_eq!(inner.micro_scale().map(|s| s.microdis_num), Some(1));
        assert_eq!(m.first_id_by_type(MaterialKind::NewmanMultiscale), Some(3));
        assert_eq!(m.first_id_by_type(MaterialKind::StructMultiscale), None);
    }

    #[test]
    fn registration_errors() {
        assert!(matches!(
            map(&["MAT 1 MAT_ion DIFFUSIVITY 1 VALENCE 1", "MAT 1 MAT_ion DIFFUSIVITY 2 VALENCE 1"]),
            Err(DeckError::DuplicateMaterial(1))
        ));
        let e = map(&["MAT 7 MAT_unknown X 1"]).unwrap_err();
        assert_eq!(e.to_string(), "material 'MAT 7' with name 'MAT_unknown' could not be identified");
        assert!(matches!(map(&["MATERIAL one"]), Err(DeckError::MalformedMaterial(_))));
        assert!(matches!(
            map(&["MAT 2 MAT_elchphase EPSILON 1.0 TORTUOSITY 1.0 NUMMAT 1 MATIDS 9"]),
            Err(DeckError::UnknownMaterial { id: 9, .. })
        ));
    }
}
