use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::audio::concat_wavs;
use crate::error::{Error, Result};
use crate::openai::{OpenAiClient, SPEECH_INPUT_LIMIT};
use crate::text::split_to_max_chars;

const CHUNK_PAUSE: Duration = Duration::from_millis(150);

/// Narrates `text` into `<work_dir>/<stem>.wav`, one speech request per
/// API-sized chunk.
pub async fn synthesize(
    client: &OpenAiClient,
    text: &str,
    work_dir: &Path,
    stem: &str,
) -> Result<PathBuf> {
    if text.trim().is_empty() {
        return Err(Error::NotFound(format!("narration text for {stem}")));
    }
    fs::create_dir_all(work_dir)?;
    let chunks = split_to_max_chars(text, SPEECH_INPUT_LIMIT);
    if chunks.len() > 1 {
        info!(
            "audio is too long for one request. requesting {} audio files",
            chunks.len()
        );
    }

    let mut part_files = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        let fname = work_dir.join(format!("{stem}-part-{i:03}.wav"));
        info!(
            "Generating TTS chunk {}/{} ({} chars)",
            i + 1,
            chunks.len(),
            chunk.len()
        );
        debug!("Chunk text: {}", chunk);
        let audio = client.speech(chunk.trim()).await?;
        fs::write(&fname, audio)?;
        part_files.push(fname);
        if i + 1 < chunks.len() {
            sleep(CHUNK_PAUSE).await;
        }
    }

    let out = work_dir.join(format!("{stem}.wav"));
    concat_wavs(&part_files, &out)?;
    info!("Narration written to {}", out.display());
    Ok(out)
}
