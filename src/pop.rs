//! Pop (pipeline) definitions sent to the inference endpoint.
//!
//! A pop is a list of components. Inference components may forward their
//! detections (cropped or full frame) into nested components, forming a tree:
//!
//! ```json
//! {"components": [{
//!   "type": "inference",
//!   "model": "eyepop.person:latest",
//!   "categoryName": "person",
//!   "forward": {
//!     "operator": {"type": "crop", "crop": {"boxPadding": 0.5}},
//!     "targets": [{"type": "inference", "model": "eyepop.person.pose:latest"}]
//!   }
//! }]}
//! ```

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const PRESET_NAMES: &[&str] = &["person", "person-2d-pose", "person-3d-pose"];

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PopDefinition {
    pub components: Vec<PopComponent>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PopComponent {
    Inference(InferenceStage),
    Tracing(TracingStage),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceStage {
    /// Public model name, e.g. `eyepop.person:latest`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Account-trained model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_uuid: Option<String>,
    /// Prompted ability, e.g. `eyepop.image-contents:latest`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ability: Option<String>,
    /// Category assigned to this stage's detections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f32>,
    /// Free-form parameters passed through to the model (prompts etc).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    /// Run the stage but drop its own objects from the output.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward: Option<Forward>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TracingStage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Forward {
    pub operator: ForwardOperator,
    #[serde(default)]
    pub targets: Vec<PopComponent>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ForwardOperator {
    Crop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        crop: Option<CropOptions>,
    },
    Full,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CropOptions {
    /// Padding as a fraction of the box size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub box_padding: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_classes: Option<Vec<String>>,
    /// Rotate crops so the detected orientation lands on this angle (degrees).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation_target_angle: Option<f32>,
}

impl PopDefinition {
    /// Loads a definition from JSON, or TOML when the extension is `.toml`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read pop definition {}", path.display()))?;
        let pop: Self = if is_toml(path) {
            toml::from_str(&raw)
                .map_err(|e| anyhow!("invalid pop definition {}: {}", path.display(), e))?
        } else {
            serde_json::from_str(&raw)
                .map_err(|e| anyhow!("invalid pop definition {}: {}", path.display(), e))?
        };
        pop.validate()
            .with_context(|| format!("invalid pop definition {}", path.display()))?;
        Ok(pop)
    }

    /// A preset name, otherwise a path to a definition file.
    pub fn resolve(value: &str) -> Result<Self> {
        match Self::preset(value) {
            Some(pop) => Ok(pop),
            None => Self::from_path(Path::new(value)),
        }
    }

    pub fn preset(name: &str) -> Option<Self> {
        let person = |forward: Option<Forward>| InferenceStage {
            model: Some("eyepop.person:latest".into()),
            category_name: Some("person".into()),
            confidence_threshold: Some(0.9),
            forward,
            ..InferenceStage::default()
        };
        let crop = |box_padding: f32, orientation: Option<f32>| ForwardOperator::Crop {
            crop: Some(CropOptions {
                box_padding: Some(box_padding),
                orientation_target_angle: orientation,
                ..CropOptions::default()
            }),
        };
        let pose_2d = InferenceStage {
            model: Some("eyepop.person.pose:latest".into()),
            ..InferenceStage::default()
        };
        let root = match name {
            "person" => person(None),
            "person-2d-pose" => person(Some(Forward {
                operator: crop(0.5, None),
                targets: vec![PopComponent::Inference(pose_2d)],
            })),
            "person-3d-pose" => {
                let body_3d = InferenceStage {
                    model: Some("eyepop.person.3d-body-points.heavy:latest".into()),
                    category_name: Some("3d-body-points".into()),
                    confidence_threshold: Some(0.25),
                    ..InferenceStage::default()
                };
                let pose = InferenceStage {
                    hidden: true,
                    forward: Some(Forward {
                        operator: crop(0.5, Some(-90.0)),
                        targets: vec![PopComponent::Inference(body_3d)],
                    }),
                    ..pose_2d
                };
                person(Some(Forward {
                    operator: crop(0.5, None),
                    targets: vec![PopComponent::Inference(pose)],
                }))
            }
            _ => return None,
        };
        Some(Self {
            components: vec![PopComponent::Inference(root)],
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.components.is_empty() {
            bail!("pop definition has no components");
        }
        for (i, component) in self.components.iter().enumerate() {
            validate_component(component, &format!("components[{i}]"))?;
        }
        Ok(())
    }

    /// Every `categoryName` in the tree, depth first.
    pub fn category_names(&self) -> Vec<&str> {
        fn collect<'a>(components: &'a [PopComponent], out: &mut Vec<&'a str>) {
            for component in components {
                if let PopComponent::Inference(stage) = component {
                    if let Some(name) = stage.category_name.as_deref() {
                        out.push(name);
                    }
                    if let Some(forward) = &stage.forward {
                        collect(&forward.targets, out);
                    }
                }
            }
        }
        let mut out = Vec::new();
        collect(&self.components, &mut out);
        out
    }
}

fn validate_component(component: &PopComponent, at: &str) -> Result<()> {
    let stage = match component {
        PopComponent::Inference(stage) => stage,
        PopComponent::Tracing(_) => return Ok(()),
    };
    let has_model = [&stage.model, &stage.model_uuid, &stage.ability]
        .into_iter()
        .flatten()
        .any(|v| !v.trim().is_empty());
    if !has_model {
        bail!("{at}: inference stage needs one of model, modelUuid or ability");
    }
    if let Some(threshold) = stage.confidence_threshold {
        if !(0.0..=1.0).contains(&threshold) {
            bail!("{at}: confidenceThreshold must be within 0..=1, got {threshold}");
        }
    }
    let Some(forward) = &stage.forward else {
        return Ok(());
    };
    if let ForwardOperator::Crop { crop: Some(crop) } = &forward.operator {
        if crop.box_padding.is_some_and(|p| !p.is_finite() || p < 0.0) {
            bail!("{at}: crop boxPadding must be a non-negative number");
        }
        if crop.max_items == Some(0) {
            bail!("{at}: crop maxItems must be greater than zero");
        }
    }
    if forward.targets.is_empty() {
        bail!("{at}: forward has no targets");
    }
    for (i, target) in forward.targets.iter().enumerate() {
        validate_component(target, &format!("{at}.forward.targets[{i}]"))?;
    }
    Ok(())
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}
