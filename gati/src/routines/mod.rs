//! Routine library: named multi-step motion sequences.
//!
//! Loaded once at startup and read-only afterwards. The bundled catalog is
//! `resources/routines.toml`; `control.routines_file` replaces it.

use crate::config::MotionConfig;
use crate::error::{Error, Result};
use crate::motion::{MotionCommand, MoveDirection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const BUNDLED_CATALOG: &str = include_str!("../../resources/routines.toml");

/// Accepted range for timed steps
pub const MIN_STEP_MS: u64 = 1;
pub const MAX_STEP_MS: u64 = 60_000;

/// One step of a routine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MotionStep {
    Walk {
        #[serde(default)]
        forward: f32,
        #[serde(default)]
        lateral: f32,
        #[serde(default)]
        yaw: f32,
        duration_ms: u64,
    },
    Group {
        name: String,
    },
    Pause {
        duration_ms: u64,
    },
    Stand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Routine {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<MotionStep>,
}

impl Routine {
    /// Single-step routine for a manual `move` command
    pub fn manual_move(direction: MoveDirection, duration_ms: u64, motion: &MotionConfig) -> Self {
        let step = match direction.gait(motion) {
            MotionCommand::Walk {
                forward,
                lateral,
                yaw,
            } => MotionStep::Walk {
                forward,
                lateral,
                yaw,
                duration_ms,
            },
            MotionCommand::Halt => MotionStep::Pause { duration_ms },
        };
        Self {
            name: format!("move:{}", direction.as_str()),
            description: String::new(),
            steps: vec![step],
        }
    }

    fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(Error::Config(format!("routine '{}': {}", self.name, msg)));
        if self.name.trim().is_empty() {
            return Err(Error::Config("routine with empty name".into()));
        }
        if self.steps.is_empty() {
            return bad("no steps".into());
        }
        for (i, step) in self.steps.iter().enumerate() {
            let n = i + 1;
            match step {
                MotionStep::Walk {
                    forward,
                    lateral,
                    yaw,
                    duration_ms,
                } => {
                    if ![forward, lateral, yaw]
                        .iter()
                        .all(|v| v.is_finite() && (-1.0..=1.0).contains(*v))
                    {
                        return bad(format!("step {}: gait values must be in [-1, 1]", n));
                    }
                    check_duration(*duration_ms).or_else(|m| bad(format!("step {}: {}", n, m)))?;
                }
                MotionStep::Pause { duration_ms } => {
                    check_duration(*duration_ms).or_else(|m| bad(format!("step {}: {}", n, m)))?;
                }
                MotionStep::Group { name } => {
                    if name.trim().is_empty() {
                        return bad(format!("step {}: empty group name", n));
                    }
                }
                MotionStep::Stand => {}
            }
        }
        Ok(())
    }
}

fn check_duration(ms: u64) -> std::result::Result<(), String> {
    if (MIN_STEP_MS..=MAX_STEP_MS).contains(&ms) {
        Ok(())
    } else {
        Err(format!(
            "duration {} ms outside {}..={}",
            ms, MIN_STEP_MS, MAX_STEP_MS
        ))
    }
}

#[derive(Deserialize)]
struct Catalog {
    #[serde(default, rename = "routine")]
    routines: Vec<Routine>,
}

/// Read-only routine catalog
#[derive(Debug, Clone)]
pub struct RoutineLibrary {
    routines: BTreeMap<String, Routine>,
}

impl RoutineLibrary {
    /// Catalog compiled into the binary
    pub fn bundled() -> Result<Self> {
        Self::from_toml_str(BUNDLED_CATALOG)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read routine catalog: {}", e)))?;
        Self::from_toml_str(&content)
    }

    /// The configured override, or the bundled catalog
    pub fn from_config(routines_file: Option<&str>) -> Result<Self> {
        match routines_file {
            Some(path) => Self::load(Path::new(path)),
            None => Self::bundled(),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let catalog: Catalog = toml::from_str(content)?;
        Self::from_routines(catalog.routines)
    }

    pub fn from_routines(list: Vec<Routine>) -> Result<Self> {
        let mut routines = BTreeMap::new();
        for routine in list {
            routine.validate()?;
            let name = routine.name.clone();
            if routines.insert(name.clone(), routine).is_some() {
                return Err(Error::Config(format!("duplicate routine '{}'", name)));
            }
        }
        log::info!("Loaded {} routines", routines.len());
        Ok(Self { routines })
    }

    pub fn lookup(&self, name: &str) -> Option<&Routine> {
        self.routines.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.routines.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_catalog_loads() {
        let lib = RoutineLibrary::bundled().unwrap();
        assert!(lib.lookup("patrol").is_some());
        let pick = lib.lookup("pick_transport").unwrap();
        assert_eq!(pick.steps[1], MotionStep::Group { name: "grab".into() });
        assert!(lib.lookup("moonwalk").is_none());
    }

    #[test]
    fn test_walk_defaults_missing_components() {
        let lib = RoutineLibrary::from_toml_str(
            r#"
[[routine]]
name = "nudge"
steps = [{ kind = "walk", forward = 0.3, duration_ms = 100 }]
"#,
        )
        .unwrap();
        assert_eq!(
            lib.lookup("nudge").unwrap().steps[0],
            MotionStep::Walk {
                forward: 0.3,
                lateral: 0.0,
                yaw: 0.0,
                duration_ms: 100
            }
        );
    }

    #[test]
    fn test_rejects_duplicates() {
        let toml = r#"
[[routine]]
name = "a"
steps = [{ kind = "stand" }]

[[routine]]
name = "a"
steps = [{ kind = "stand" }]
"#;
        assert!(matches!(
            RoutineLibrary::from_toml_str(toml),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_rejects_invalid_steps() {
        for steps in [
            "[]",
            r#"[{ kind = "walk", forward = 2.0, duration_ms = 100 }]"#,
            r#"[{ kind = "pause", duration_ms = 0 }]"#,
            r#"[{ kind = "pause", duration_ms = 60001 }]"#,
            r#"[{ kind = "group", name = "" }]"#,
            r#"[{ kind = "fly" }]"#,
        ] {
            let toml = format!("[[routine]]\nname = \"x\"\nsteps = {}\n", steps);
            assert!(
                RoutineLibrary::from_toml_str(&toml).is_err(),
                "accepted {}",
                steps
            );
        }
    }

    #[test]
    fn test_manual_move() {
        let r = Routine::manual_move(MoveDirection::TurnRight, 800, &MotionConfig::default());
        assert_eq!(r.name, "move:turn_right");
        let MotionStep::Walk {
            yaw, duration_ms, ..
        } = r.steps[0]
        else {
            panic!("expected walk");
        };
        assert!(yaw < 0.0);
        assert_eq!(duration_ms, 800);
    }
}
