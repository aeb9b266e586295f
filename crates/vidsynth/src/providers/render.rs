//! Video assembly with ffmpeg.
//!
//! A job renders as: intro card, one color card per scene, outro card,
//! concatenated and then muxed with the narration when there is any.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::error::{ProviderError, Result};
use super::{Provider, RenderRequest, Renderer};
use crate::config::RenderConfig;
use crate::secrets::expand_home;

const MIN_SCENE_SECS: f64 = 1.0;
const DEFAULT_COLOR: &str = "black";

pub struct FfmpegRenderer {
    ffmpeg: String,
    settings: RenderConfig,
    output_dir: PathBuf,
    work_dir: PathBuf,
}

/// One solid-color card with centered text.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Card {
    pub color: String,
    pub text: String,
    pub duration: f64,
}

impl FfmpegRenderer {
    pub fn new(settings: &RenderConfig, output_dir: PathBuf, work_dir: PathBuf) -> Self {
        Self {
            ffmpeg: expand_home(&settings.ffmpeg_path),
            settings: settings.clone(),
            output_dir,
            work_dir,
        }
    }

    pub fn output_path(&self, job_id: &str) -> PathBuf {
        self.output_dir.join(format!("video_{}.mp4", job_id))
    }

    pub(crate) fn cards(&self, request: &RenderRequest) -> Vec<Card> {
        let colors: Vec<String> = if request.style.colors.is_empty() {
            vec![DEFAULT_COLOR.to_string()]
        } else {
            request.style.colors.iter().map(|c| ffmpeg_color(c)).collect()
        };

        let mut cards = Vec::with_capacity(request.script.scenes.len() + 2);
        cards.push(Card {
            color: colors[0].clone(),
            text: request.script.topic.clone(),
            duration: self.settings.intro_secs,
        });

        for (i, scene) in request.script.scenes.iter().enumerate() {
            let text = if scene.concept.trim().is_empty() {
                format!("Scene {}", scene.scene_number)
            } else {
                scene.concept.clone()
            };
            cards.push(Card {
                color: colors[(i + 1) % colors.len()].clone(),
                text,
                duration: scene.duration.max(MIN_SCENE_SECS),
            });
        }

        cards.push(Card {
            color: colors[0].clone(),
            text: "Thanks for watching".to_string(),
            duration: self.settings.outro_secs,
        });

        cards.retain(|c| c.duration > 0.0);
        cards
    }

    pub(crate) fn card_args(&self, card: &Card, output: &Path) -> Vec<String> {
        let source = format!(
            "color=c={}:s={}x{}:d={}:r={}",
            card.color, self.settings.width, self.settings.height, card.duration, self.settings.fps
        );
        let text = format!(
            "drawtext=text='{}':fontcolor=white:fontsize={}:x=(w-text_w)/2:y=(h-text_h)/2",
            escape_drawtext(&card.text),
            self.settings.height / 16
        );
        vec![
            "-y".into(),
            "-f".into(),
            "lavfi".into(),
            "-i".into(),
            source,
            "-vf".into(),
            text,
            "-c:v".into(),
            "libx264".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            output.display().to_string(),
        ]
    }

    pub(crate) fn concat_args(list: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".into(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            list.display().to_string(),
            "-c".into(),
            "copy".into(),
            output.display().to_string(),
        ]
    }

    pub(crate) fn mux_args(video: &Path, audio: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".into(),
            "-i".into(),
            video.display().to_string(),
            "-i".into(),
            audio.display().to_string(),
            "-c:v".into(),
            "copy".into(),
            "-c:a".into(),
            "aac".into(),
            "-shortest".into(),
            output.display().to_string(),
        ]
    }

    async fn run_ffmpeg(&self, args: &[String]) -> Result<()> {
        log::debug!("ffmpeg {}", args.join(" "));

        let output = Command::new(&self.ffmpeg)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ProviderError::RenderFailed(format!("Failed to start '{}': {}", self.ffmpeg, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            return Err(ProviderError::RenderFailed(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            )));
        }
        Ok(())
    }

    async fn render_in(&self, request: &RenderRequest, work: &Path) -> Result<PathBuf> {
        let mut list = String::new();
        for (i, card) in self.cards(request).iter().enumerate() {
            let clip = work.join(format!("clip_{:03}.mp4", i));
            self.run_ffmpeg(&self.card_args(card, &clip)).await?;
            list.push_str(&format!("file '{}'\n", clip.display()));
        }

        let list_path = work.join("concat.txt");
        tokio::fs::write(&list_path, list)
            .await
            .map_err(|e| ProviderError::io(&list_path, e))?;

        let output = self.output_path(&request.job_id);
        let audio = match &request.audio_path {
            Some(path) => usable_audio(path).await,
            None => None,
        };

        match audio {
            Some(audio) => {
                let silent = work.join("silent.mp4");
                self.run_ffmpeg(&Self::concat_args(&list_path, &silent)).await?;
                self.run_ffmpeg(&Self::mux_args(&silent, audio, &output)).await?;
            }
            None => {
                log::info!("Rendering job {} without narration", request.job_id);
                self.run_ffmpeg(&Self::concat_args(&list_path, &output)).await?;
            }
        }

        Ok(output)
    }
}

/// Returns the path when it points at a non-empty file.
async fn usable_audio(path: &Path) -> Option<&Path> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Some(path),
        _ => None,
    }
}

/// Turns `#RRGGBB` into ffmpeg's `0xRRGGBB`; names pass through.
fn ffmpeg_color(color: &str) -> String {
    let color = color.trim();
    match color.strip_prefix('#') {
        Some(hex) => format!("0x{}", hex),
        None if color.is_empty() => DEFAULT_COLOR.to_string(),
        None => color.to_string(),
    }
}

fn escape_drawtext(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '\'' | ':' | '%' | ',' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\n' => escaped.push(' '),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl Provider for FfmpegRenderer {
    fn name(&self) -> &str {
        "ffmpeg"
    }
}

#[async_trait]
impl Renderer for FfmpegRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<PathBuf> {
        if request.script.scenes.is_empty() {
            return Err(ProviderError::RenderFailed(
                "script has no scenes to render".to_string(),
            ));
        }

        for dir in [&self.output_dir, &self.work_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ProviderError::io(dir.as_path(), e))?;
        }

        let work = WorkDir::create(self.work_dir.join(format!("render_{}", request.job_id))).await?;

        log::info!(
            "Rendering {} scenes for job {}",
            request.script.scenes.len(),
            request.job_id
        );
        let output = self.render_in(request, work.path()).await?;
        Ok(output)
    }
}

/// Scratch directory for one render, removed when dropped.
///
/// Dropping also happens when the render future is cancelled by a timeout.
struct WorkDir {
    path: PathBuf,
}

impl WorkDir {
    async fn create(path: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| ProviderError::io(&path, e))?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to clean up render directory {:?}: {}", self.path, e),
        }
    }
}
