//! Remux and transcode operations

use super::runner::{Tool, ToolRunner, os_args};
use crate::config::LossyBitrate;
use crate::error::Result;
use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

const FASTSTART: &str = "+faststart";

/// `ffmpeg -loglevel error -y [-decryption_key K] -i IN… -c copy [-c:s mov_text] -movflags +faststart OUT`
pub fn ffmpeg_copy_args(
    inputs: &[&Path],
    output: &Path,
    key: Option<&str>,
    copy_subtitles: bool,
) -> Vec<OsString> {
    let mut args = os_args(["-loglevel", "error", "-y"]);
    if let Some(key) = key {
        args.push("-decryption_key".into());
        args.push(key.into());
    }
    for input in inputs {
        args.push("-i".into());
        args.push(input.as_os_str().to_owned());
    }
    args.extend(os_args(["-c", "copy"]));
    if copy_subtitles {
        args.extend(os_args(["-c:s", "mov_text"]));
    }
    args.extend(os_args(["-movflags", FASTSTART]));
    args.push(output.as_os_str().to_owned());
    args
}

/// `ffmpeg -loglevel error -y [-decryption_key K] -i IN -codec:a libmp3lame -b:a RATE -id3v2_version 3 OUT`
pub fn ffmpeg_mp3_args(
    input: &Path,
    output: &Path,
    bitrate: LossyBitrate,
    key: Option<&str>,
) -> Vec<OsString> {
    let mut args = os_args(["-loglevel", "error", "-y"]);
    if let Some(key) = key {
        args.push("-decryption_key".into());
        args.push(key.into());
    }
    args.push("-i".into());
    args.push(input.as_os_str().to_owned());
    args.extend(os_args([
        "-codec:a",
        "libmp3lame",
        "-b:a",
        bitrate.as_arg(),
        "-id3v2_version",
        "3",
    ]));
    args.push(output.as_os_str().to_owned());
    args
}

/// `MP4Box -quiet -add IN… -itags keep -new OUT`
pub fn mp4box_args(inputs: &[&Path], output: &Path) -> Vec<OsString> {
    let mut args = os_args(["-quiet"]);
    for input in inputs {
        args.push("-add".into());
        args.push(input.as_os_str().to_owned());
    }
    args.extend(os_args(["-itags", "keep", "-new"]));
    args.push(output.as_os_str().to_owned());
    args
}

/// Runs remux tools for one item
#[derive(Clone)]
pub struct Remuxer {
    runner: Arc<dyn ToolRunner>,
}

impl Remuxer {
    /// Create a remuxer
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }

    /// Stream-copy remux with ffmpeg, optionally decrypting on the way
    pub async fn ffmpeg(
        &self,
        inputs: &[&Path],
        output: &Path,
        key: Option<&str>,
        copy_subtitles: bool,
    ) -> Result<()> {
        let args = ffmpeg_copy_args(inputs, output, key, copy_subtitles);
        self.runner.run(Tool::Ffmpeg, args).await?;
        Ok(())
    }

    /// Remux with MP4Box
    pub async fn mp4box(&self, inputs: &[&Path], output: &Path) -> Result<()> {
        self.runner.run(Tool::Mp4Box, mp4box_args(inputs, output)).await?;
        Ok(())
    }

    /// Transcode to mp3, optionally decrypting on the way
    pub async fn mp3(
        &self,
        input: &Path,
        output: &Path,
        bitrate: LossyBitrate,
        key: Option<&str>,
    ) -> Result<()> {
        let args = ffmpeg_mp3_args(input, output, bitrate, key);
        self.runner.run(Tool::Ffmpeg, args).await?;
        Ok(())
    }
}
