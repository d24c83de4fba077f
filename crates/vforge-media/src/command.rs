//! FFmpeg command builder.

use std::path::{Path, PathBuf};

use vforge_models::EncodingConfig;

use crate::error::{MediaError, MediaResult};
use crate::graph::{FilterGraph, StreamRef};

/// One `-i` input with the options that precede it.
#[derive(Debug, Clone, PartialEq)]
pub struct Input {
    pub args: Vec<String>,
    pub path: PathBuf,
}

/// Builder for FFmpeg commands.
///
/// Holds the invocation in structured form; [`FfmpegCommand::build_args`] is the
/// only place where it becomes an argument vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegCommand {
    /// Inputs in `-i` order
    inputs: Vec<Input>,
    /// Optional `-filter_complex` graph
    filter_graph: Option<FilterGraph>,
    /// Output arguments (after the inputs and graph)
    output_args: Vec<String>,
    /// Output file path
    output: PathBuf,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command writing to `output`.
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            filter_graph: None,
            output_args: Vec::new(),
            output: output.as_ref().to_path_buf(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add an input file.
    pub fn input(self, path: impl AsRef<Path>) -> Self {
        self.input_with_args(Vec::<String>::new(), path)
    }

    /// Add an input file with options placed before its `-i`.
    pub fn input_with_args<I, S>(mut self, args: I, path: impl AsRef<Path>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.push(Input {
            args: args.into_iter().map(Into::into).collect(),
            path: path.as_ref().to_path_buf(),
        });
        self
    }

    /// Set the filter graph.
    pub fn filter_graph(mut self, graph: FilterGraph) -> Self {
        self.filter_graph = Some(graph);
        self
    }

    /// Add an output argument.
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Map a stream or graph label to the output.
    pub fn map(self, stream: &StreamRef) -> Self {
        self.output_arg("-map").output_arg(stream.map_spec())
    }

    /// Map an optional stream (`0:a?`).
    pub fn map_optional(self, stream: &StreamRef) -> Self {
        let spec = format!("{}?", stream.map_spec());
        self.output_arg("-map").output_arg(spec)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set audio bitrate.
    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Re-encode video and audio with the given settings.
    pub fn encoding(self, encoding: &EncodingConfig) -> Self {
        self.output_args(encoding.to_ffmpeg_args())
    }

    /// Copy all streams without re-encoding.
    pub fn stream_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Stop at the end of the shortest stream.
    pub fn shortest(self) -> Self {
        self.output_arg("-shortest")
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn graph(&self) -> Option<&FilterGraph> {
        self.filter_graph.as_ref()
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Arguments after the inputs and graph, excluding the output path.
    pub fn output_options(&self) -> &[String] {
        &self.output_args
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        // Overwrite flag
        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-hide_banner".to_string());
        args.push("-v".to_string());
        args.push(self.log_level.clone());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().to_string());
        }

        if let Some(graph) = self.filter_graph.as_ref().filter(|g| !g.is_empty()) {
            args.push("-filter_complex".to_string());
            args.push(graph.to_string());
        }

        args.extend(self.output_args.iter().cloned());

        // Output file
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Check if the FFmpeg binary is available.
pub fn check_ffmpeg(binary: &str) -> MediaResult<PathBuf> {
    which::which(binary).map_err(|_| MediaError::FfmpegNotFound(binary.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Filter, FilterChain};

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("out.mp4")
            .input("a.mp4")
            .input_with_args(["-f", "concat", "-safe", "0"], "list.txt")
            .video_codec("libx264");

        let args = cmd.build_args();
        assert_eq!(
            args,
            vec![
                "-y", "-hide_banner", "-v", "error", "-i", "a.mp4", "-f", "concat", "-safe", "0",
                "-i", "list.txt", "-c:v", "libx264", "out.mp4"
            ]
        );
    }

    #[test]
    fn test_filter_graph_rendered_once() {
        let mut graph = FilterGraph::new();
        graph.push(
            FilterChain::new()
                .input(StreamRef::video(0))
                .filter(Filter::new("null"))
                .output(StreamRef::label("outv")),
        );
        let args = FfmpegCommand::new("out.mp4")
            .input("in.mp4")
            .filter_graph(graph)
            .map(&StreamRef::label("outv"))
            .map_optional(&StreamRef::audio(0))
            .build_args();

        let pos = args.iter().position(|a| a == "-filter_complex").unwrap();
        assert_eq!(args[pos + 1], "[0:v]null[outv]");
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "[outv]"));
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "0:a?"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn test_empty_graph_is_omitted() {
        let args = FfmpegCommand::new("out.mp4")
            .input("in.mp4")
            .filter_graph(FilterGraph::new())
            .stream_copy()
            .build_args();
        assert!(!args.contains(&"-filter_complex".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));
    }
}
