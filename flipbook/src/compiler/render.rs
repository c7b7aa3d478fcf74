//! HTML rendering.

use super::{escape_html, escape_script_json, FlipbookDocument, Hotspot};
use crate::core::{hash_hex, Artifact, ImageArtifact, StageKind, TextArtifact};
use crate::errors::CompileError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// three.js build loaded by the viewer.
pub const DEFAULT_SCRIPT_SRC: &str =
    "https://cdnjs.cloudflare.com/ajax/libs/three.js/r134/three.min.js";

const VIEWER_SCRIPT: &str = r#"(function () {
            var hotspots = JSON.parse(document.getElementById("flipbook-hotspots").textContent);
            var scene = JSON.parse(document.getElementById("flipbook-scene").textContent);
            var canvas = document.getElementById("flipbook-canvas");
            hotspots.forEach(function (spot) {
                var button = document.createElement("button");
                button.className = "flipbook-hotspot";
                button.style.left = spot.x + "px";
                button.style.top = spot.y + "px";
                button.dataset.action = spot.trigger_action;
                canvas.appendChild(button);
            });
            if (typeof THREE === "undefined" || !scene.webgl) {
                return;
            }
            var renderer = new THREE.WebGLRenderer({ antialias: true, alpha: true });
            renderer.setSize(canvas.clientWidth || 512, canvas.clientHeight || 512);
            canvas.appendChild(renderer.domElement);
            canvas.dataset.animationSpeed = scene.animation_speed;
        })();"#;

/// Static rendering settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Document title and heading.
    pub title: String,
    /// URL of the three.js script.
    pub script_src: String,
    /// Page-flip animation speed passed to the viewer.
    pub animation_speed: f64,
    /// WebGL version requested by the viewer (0 disables the canvas).
    pub webgl: u8,
    /// Optional caption shown under the hotspots.
    pub hotspot_hint: Option<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            title: "AI Flipbook".to_string(),
            script_src: DEFAULT_SCRIPT_SRC.to_string(),
            animation_speed: 2.0,
            webgl: 1,
            hotspot_hint: Some("Tap to see the duck waddle!".to_string()),
        }
    }
}

/// Assembles flipbook documents.
#[derive(Debug, Clone, Default)]
pub struct FlipbookCompiler {
    config: CompilerConfig,
}

impl FlipbookCompiler {
    /// Creates a compiler.
    #[must_use]
    pub const fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    /// The rendering settings.
    #[must_use]
    pub const fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compiles an image and a story into a document.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::InvalidArtifact`] if either artifact is of the
    /// wrong kind or not valid, or a hotspot has no action.
    pub fn compile(
        &self,
        image: &Artifact,
        story: &Artifact,
        hotspots: &[Hotspot],
    ) -> Result<FlipbookDocument, CompileError> {
        let result = self.render(image, story, hotspots);
        if let Err(error) = &result {
            tracing::error!(error = %error, "Flipbook compilation rejected its inputs");
        }
        result
    }

    fn render(
        &self,
        image: &Artifact,
        story: &Artifact,
        hotspots: &[Hotspot],
    ) -> Result<FlipbookDocument, CompileError> {
        let image = expect_image(image)?;
        let story = expect_text(story)?;
        if let Some(index) = hotspots
            .iter()
            .position(|spot| spot.trigger_action.trim().is_empty())
        {
            return Err(CompileError::invalid_artifact(
                "hotspot",
                format!("hotspot {index} has no trigger action"),
            ));
        }

        let hotspot_json = serde_json::to_string(hotspots)
            .map_err(|e| CompileError::Encoding(e.to_string()))?;
        let scene_json = serde_json::to_string(&serde_json::json!({
            "webgl": self.config.webgl,
            "animation_speed": self.config.animation_speed,
        }))
        .map_err(|e| CompileError::Encoding(e.to_string()))?;

        let title = escape_html(&self.config.title);
        let mut html = String::with_capacity(image.bytes.len() * 4 / 3 + story.body.len() + 2048);

        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
        html.push_str("    <meta charset=\"UTF-8\">\n");
        html.push_str(
            "    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n",
        );
        html.push_str(&format!("    <title>{title}</title>\n"));
        html.push_str(&format!(
            "    <script src=\"{}\"></script>\n",
            escape_html(&self.config.script_src)
        ));
        html.push_str("</head>\n<body>\n");
        html.push_str(&format!("    <h1>{title}</h1>\n"));

        html.push_str(&render_image(image));
        html.push_str("    <section class=\"flipbook-story\">\n");
        for paragraph in paragraphs(&story.body) {
            html.push_str(&format!("        <p>{}</p>\n", escape_html(&paragraph)));
        }
        html.push_str("    </section>\n");

        if let Some(hint) = &self.config.hotspot_hint {
            if !hotspots.is_empty() {
                html.push_str(&format!(
                    "    <p class=\"flipbook-hint\">{}</p>\n",
                    escape_html(hint)
                ));
            }
        }

        html.push_str(&format!(
            "    <div id=\"flipbook-canvas\" data-image-fingerprint=\"{}\" data-story-fingerprint=\"{}\"></div>\n",
            image.meta.fingerprint, story.meta.fingerprint
        ));
        html.push_str(&format!(
            "    <script type=\"application/json\" id=\"flipbook-hotspots\">{}</script>\n",
            escape_script_json(&hotspot_json)
        ));
        html.push_str(&format!(
            "    <script type=\"application/json\" id=\"flipbook-scene\">{}</script>\n",
            escape_script_json(&scene_json)
        ));
        html.push_str("    <script>\n        ");
        html.push_str(VIEWER_SCRIPT);
        html.push_str("\n    </script>\n</body>\n</html>\n");

        let content_hash = hash_hex(html.as_bytes());
        tracing::debug!(
            image = image.meta.fingerprint.short(),
            story = story.meta.fingerprint.short(),
            content_hash = &content_hash[..12],
            bytes = html.len(),
            "Compiled flipbook"
        );

        Ok(FlipbookDocument {
            image_fingerprint: image.meta.fingerprint.clone(),
            story_fingerprint: story.meta.fingerprint.clone(),
            hotspots: hotspots.to_vec(),
            html,
            content_hash,
            storage: None,
        })
    }
}

fn expect_image(artifact: &Artifact) -> Result<&ImageArtifact, CompileError> {
    let Some(image) = artifact.as_image() else {
        return Err(CompileError::invalid_artifact(
            "image",
            format!("expected an image artifact, got {}", artifact.kind()),
        ));
    };
    if !image.meta.valid {
        return Err(CompileError::invalid_artifact("image", "artifact is marked invalid"));
    }
    if image.bytes.is_empty() {
        return Err(CompileError::invalid_artifact("image", "image payload is empty"));
    }
    Ok(image)
}

fn expect_text(artifact: &Artifact) -> Result<&TextArtifact, CompileError> {
    let Some(text) = artifact.as_text() else {
        return Err(CompileError::invalid_artifact(
            "story",
            format!("expected a {} artifact, got {}", StageKind::Text, artifact.kind()),
        ));
    };
    if !text.meta.valid {
        return Err(CompileError::invalid_artifact("story", "artifact is marked invalid"));
    }
    if text.body.trim().is_empty() {
        return Err(CompileError::invalid_artifact("story", "story text is empty"));
    }
    Ok(text)
}

fn render_image(image: &ImageArtifact) -> String {
    let mut dimensions = String::new();
    if let Some(width) = image.width {
        dimensions.push_str(&format!(" width=\"{width}\""));
    }
    if let Some(height) = image.height {
        dimensions.push_str(&format!(" height=\"{height}\""));
    }
    format!(
        "    <figure class=\"flipbook-image\">\n        <img src=\"data:{};base64,{}\" alt=\"Flipbook illustration\"{dimensions}>\n    </figure>\n",
        escape_html(&image.media_type),
        STANDARD.encode(&image.bytes)
    )
}

/// Splits story text on blank lines, collapsing whitespace inside paragraphs.
fn paragraphs(body: &str) -> Vec<String> {
    body.split("\n\n")
        .map(|chunk| chunk.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|paragraph| !paragraph.is_empty())
        .collect()
}
