//! Encoder output formats
//!
//! Every format shares the same low-latency input flags; only the codec flags
//! and the container differ.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Input flags placed before `-i <url>`
const INPUT_ARGS: &[&str] = &[
    "-hide_banner",
    "-loglevel",
    "error",
    "-reconnect",
    "1",
    "-reconnect_streamed",
    "1",
    "-reconnect_delay_max",
    "5",
    "-fflags",
    "nobuffer",
    "-flags",
    "low_delay",
];

/// Output written by a supervised encoder
pub const PIPE_OUTPUT: &str = "pipe:1";

/// What the encoder produces for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SinkFormat {
    /// Remux without re-encoding
    RawRelay,
    /// Mono low-bitrate MP3
    AudioMp3,
    /// 360p H.264/AAC in fragmented MP4
    VideoLowRes,
}

impl SinkFormat {
    pub fn name(self) -> &'static str {
        match self {
            SinkFormat::RawRelay => "raw-relay",
            SinkFormat::AudioMp3 => "audio-mp3",
            SinkFormat::VideoLowRes => "video-lowres",
        }
    }

    /// Value of the encoder's `-f` flag
    pub fn container(self) -> &'static str {
        match self {
            SinkFormat::RawRelay => "mpegts",
            SinkFormat::AudioMp3 => "mp3",
            SinkFormat::VideoLowRes => "mp4",
        }
    }

    /// HTTP content type of the produced bytes
    pub fn content_type(self) -> &'static str {
        match self {
            SinkFormat::RawRelay => "video/mp2t",
            SinkFormat::AudioMp3 => "audio/mpeg",
            SinkFormat::VideoLowRes => "video/mp4",
        }
    }

    fn codec_args(self) -> &'static [&'static str] {
        match self {
            SinkFormat::RawRelay => &["-c", "copy"],
            SinkFormat::AudioMp3 => &["-vn", "-ac", "1", "-b:a", "40k"],
            SinkFormat::VideoLowRes => &[
                "-vf",
                "scale=-2:360",
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-b:v",
                "600k",
                "-c:a",
                "aac",
                "-ac",
                "1",
                "-b:a",
                "64k",
                "-movflags",
                "frag_keyframe+empty_moov+default_base_moof",
            ],
        }
    }

    /// Encoder arguments streaming `url` to stdout
    pub fn encoder_args(self, url: &str) -> Vec<String> {
        self.encoder_args_to(url, PIPE_OUTPUT)
    }

    /// Encoder arguments writing `url` to `output`
    pub fn encoder_args_to(self, url: &str, output: &str) -> Vec<String> {
        let codec = self.codec_args();
        let mut args = Vec::with_capacity(INPUT_ARGS.len() + codec.len() + 5);

        args.extend(INPUT_ARGS.iter().map(|arg| arg.to_string()));
        args.push("-i".to_string());
        args.push(url.to_string());
        args.extend(codec.iter().map(|arg| arg.to_string()));
        args.push("-f".to_string());
        args.push(self.container().to_string());
        args.push(output.to_string());
        args
    }
}

impl fmt::Display for SinkFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
