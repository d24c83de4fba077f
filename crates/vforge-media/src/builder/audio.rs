//! Background music: trim, fades and volume on the music track, then mix or replace.

use std::path::Path;

use vforge_models::{AudioConfig, AudioMode, EncodingConfig};

use crate::command::FfmpegCommand;
use crate::error::MediaResult;
use crate::graph::{secs, Filter, FilterChain, FilterGraph, StreamRef};

use super::require_path;

/// Build the audio command: the video is input 0, the music is input 1.
///
/// The video stream is copied; the resulting audio is encoded with the
/// configured audio codec and bitrate.
pub fn build_audio(
    video_path: &str,
    audio: &AudioConfig,
    mode: AudioMode,
    output: &Path,
    encoding: &EncodingConfig,
) -> MediaResult<FfmpegCommand> {
    require_path(video_path, "video_path")?;
    require_path(&audio.file_path, "audio.file_path")?;

    let music = StreamRef::label("music");
    let mut graph = FilterGraph::new();
    graph.push(music_chain(audio).output(music.clone()));

    let cmd = FfmpegCommand::new(output)
        .input(video_path)
        .input(&audio.file_path);

    let cmd = match mode {
        AudioMode::Mix => {
            let mixed = StreamRef::label("aout");
            graph.push(
                FilterChain::new()
                    .input(StreamRef::audio(0))
                    .input(music)
                    .filter(
                        Filter::new("amix")
                            .kv("inputs", 2)
                            .kv("duration", "first")
                            .kv("dropout_transition", 2),
                    )
                    .output(mixed.clone()),
            );
            cmd.filter_graph(graph)
                .map(&StreamRef::video(0))
                .map(&mixed)
                .video_codec("copy")
                .audio_codec(&encoding.audio_codec)
                .audio_bitrate(&encoding.audio_bitrate)
        }
        AudioMode::Replace => cmd
            .filter_graph(graph)
            .map(&StreamRef::video(0))
            .map(&music)
            .video_codec("copy")
            .audio_codec(&encoding.audio_codec)
            .audio_bitrate(&encoding.audio_bitrate)
            .shortest(),
    };
    Ok(cmd)
}

/// Filters on the music input, ending at the volume stage.
fn music_chain(audio: &AudioConfig) -> FilterChain {
    let mut chain = FilterChain::new().input(StreamRef::audio(1));

    if audio.is_trimmed() {
        let mut trim = Filter::new("atrim");
        if let Some(start) = audio.start_time {
            trim = trim.kv("start", secs(start));
        }
        if let Some(end) = audio.end_time {
            trim = trim.kv("end", secs(end));
        }
        chain = chain
            .filter(trim)
            .filter(Filter::new("asetpts").arg("PTS-STARTPTS"));
    }

    if let Some(fade_in) = audio.fade_in.filter(|d| *d > 0.0) {
        chain = chain.filter(
            Filter::new("afade")
                .kv("t", "in")
                .kv("st", 0)
                .kv("d", secs(fade_in)),
        );
    }

    if let Some(fade_out) = audio.fade_out.filter(|d| *d > 0.0) {
        // Without a known length the fade starts at the beginning of the track.
        let start = audio
            .trimmed_length()
            .map(|len| len - fade_out)
            .filter(|st| *st > 0.0)
            .unwrap_or(0.0);
        chain = chain.filter(
            Filter::new("afade")
                .kv("t", "out")
                .kv("st", if start > 0.0 { secs(start) } else { "0".to_string() })
                .kv("d", secs(fade_out)),
        );
    }

    chain.filter(Filter::new("volume").arg(gain(audio.volume)))
}

/// Volume factor in its shortest exact decimal form.
fn gain(value: f64) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(audio: &AudioConfig, mode: AudioMode) -> FfmpegCommand {
        build_audio("in.mp4", audio, mode, Path::new("out.mp4"), &EncodingConfig::default()).unwrap()
    }

    #[test]
    fn test_fade_out_starts_before_trimmed_end() {
        let audio = AudioConfig::new("music.mp3", 0.3)
            .with_window(0.0, 30.0)
            .with_fades(None, Some(2.0));
        let cmd = build(&audio, AudioMode::Mix);
        let graph = cmd.graph().unwrap();

        let fade = graph.filters_named("afade").next().unwrap();
        assert_eq!(fade.get("t"), Some("out"));
        assert_eq!(fade.get("st"), Some("28.00"));
        assert_eq!(fade.get("d"), Some("2.00"));

        assert_eq!(
            graph.to_string(),
            "[1:a]atrim=start=0.00:end=30.00,asetpts=PTS-STARTPTS,\
             afade=t=out:st=28.00:d=2.00,volume=0.3[music];\
             [0:a][music]amix=inputs=2:duration=first:dropout_transition=2[aout]"
        );
    }

    #[test]
    fn test_mix_output_mapping() {
        let cmd = build(&AudioConfig::new("music.mp3", 0.5), AudioMode::Mix);
        assert_eq!(
            cmd.output_options(),
            ["-map", "0:v", "-map", "[aout]", "-c:v", "copy", "-c:a", "aac", "-b:a", "192k"]
        );
        assert_eq!(cmd.inputs().len(), 2);
        assert!(!cmd.build_args().contains(&"-shortest".to_string()));
    }

    #[test]
    fn test_untrimmed_fade_out_starts_at_zero() {
        let audio = AudioConfig::new("music.mp3", 1.0).with_fades(Some(1.5), Some(3.0));
        let graph = build(&audio, AudioMode::Mix).graph().unwrap().to_string();
        assert!(graph.starts_with(
            "[1:a]afade=t=in:st=0:d=1.50,afade=t=out:st=0:d=3.00,volume=1[music]"
        ));
    }

    #[test]
    fn test_fade_longer_than_track_starts_at_zero() {
        let audio = AudioConfig::new("music.mp3", 1.0)
            .with_window(10.0, 11.0)
            .with_fades(None, Some(2.0));
        let graph = build(&audio, AudioMode::Mix).graph().unwrap().to_string();
        assert!(graph.contains("afade=t=out:st=0:d=2.00"));
    }

    #[test]
    fn test_start_only_trim() {
        let mut audio = AudioConfig::new("music.mp3", 0.8);
        audio.start_time = Some(12.0);
        let graph = build(&audio, AudioMode::Mix).graph().unwrap().to_string();
        assert!(graph.starts_with("[1:a]atrim=start=12.00,asetpts=PTS-STARTPTS,volume=0.8[music]"));
    }

    #[test]
    fn test_volume_keeps_precision() {
        let graph = build(&AudioConfig::new("music.mp3", 0.125), AudioMode::Mix)
            .graph()
            .unwrap()
            .to_string();
        assert!(graph.starts_with("[1:a]volume=0.125[music]"));

        let quiet = build(&AudioConfig::new("music.mp3", 0.005), AudioMode::Replace);
        let volume = quiet.graph().unwrap().filters_named("volume").next().unwrap().to_string();
        assert_eq!(volume, "volume=0.005");
    }

    #[test]
    fn test_replace_mode() {
        let cmd = build(&AudioConfig::new("music.mp3", 0.5), AudioMode::Replace);
        let graph = cmd.graph().unwrap();
        assert_eq!(graph.filters_named("amix").count(), 0);
        assert_eq!(graph.to_string(), "[1:a]volume=0.5[music]");

        let args = cmd.build_args();
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "[music]"));
        assert!(args.contains(&"-shortest".to_string()));
    }
}
