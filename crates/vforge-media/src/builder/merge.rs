//! Segment merge: trim each input, reset timestamps, concatenate.

use std::path::Path;

use vforge_models::{EncodingConfig, VideoSegment};

use crate::command::FfmpegCommand;
use crate::error::MediaResult;
use crate::graph::{secs, Filter, FilterChain, FilterGraph, StreamRef};

use super::require_path;

/// Build the merge command for `segments`, input `i` being segment `i`.
pub fn build_merge(
    segments: &[VideoSegment],
    output: &Path,
    encoding: &EncodingConfig,
) -> MediaResult<FfmpegCommand> {
    let mut cmd = FfmpegCommand::new(output);
    let mut graph = FilterGraph::new();
    let mut concat = FilterChain::new();

    for (i, segment) in segments.iter().enumerate() {
        require_path(&segment.file_path, &format!("segments[{i}].file_path"))?;
        cmd = cmd.input(&segment.file_path);

        let video_label = StreamRef::label(format!("v{i}"));
        let audio_label = StreamRef::label(format!("a{i}"));

        graph.push(
            FilterChain::new()
                .input(StreamRef::video(i))
                .filter(trim_filter("trim", segment))
                .filter(Filter::new("setpts").arg("PTS-STARTPTS"))
                .output(video_label.clone()),
        );
        graph.push(
            FilterChain::new()
                .input(StreamRef::audio(i))
                .filter(trim_filter("atrim", segment))
                .filter(Filter::new("asetpts").arg("PTS-STARTPTS"))
                .output(audio_label.clone()),
        );

        concat = concat.input(video_label).input(audio_label);
    }

    let out_v = StreamRef::label("outv");
    let out_a = StreamRef::label("outa");
    graph.push(
        concat
            .filter(
                Filter::new("concat")
                    .kv("n", segments.len())
                    .kv("v", 1)
                    .kv("a", 1),
            )
            .output(out_v.clone())
            .output(out_a.clone()),
    );

    Ok(cmd
        .filter_graph(graph)
        .map(&out_v)
        .map(&out_a)
        .encoding(encoding))
}

fn trim_filter(name: &str, segment: &VideoSegment) -> Filter {
    let filter = Filter::new(name).kv("start", secs(segment.start_time));
    match segment.end_bound() {
        Some(end) => filter.kv("end", secs(end)),
        None => filter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merge(segments: &[VideoSegment]) -> FfmpegCommand {
        build_merge(segments, Path::new("out.mp4"), &EncodingConfig::default()).unwrap()
    }

    #[test]
    fn test_two_segment_merge_graph() {
        let cmd = merge(&[
            VideoSegment::new("a.mp4", 0.0, 10.0),
            VideoSegment::new("b.mp4", 5.0, 15.0),
        ]);
        assert_eq!(
            cmd.graph().unwrap().to_string(),
            "[0:v]trim=start=0.00:end=10.00,setpts=PTS-STARTPTS[v0];\
             [0:a]atrim=start=0.00:end=10.00,asetpts=PTS-STARTPTS[a0];\
             [1:v]trim=start=5.00:end=15.00,setpts=PTS-STARTPTS[v1];\
             [1:a]atrim=start=5.00:end=15.00,asetpts=PTS-STARTPTS[a1];\
             [v0][a0][v1][a1]concat=n=2:v=1:a=1[outv][outa]"
        );

        let args = cmd.build_args();
        let tail: Vec<&str> = args.iter().rev().take(11).rev().map(String::as_str).collect();
        assert_eq!(
            tail,
            vec!["-c:v", "libx264", "-preset", "medium", "-crf", "23", "-c:a", "aac", "-b:a", "192k", "out.mp4"]
        );
    }

    #[test]
    fn test_n_segments_feed_one_concat_in_order() {
        for n in 2..=6 {
            let segments: Vec<_> = (0..n)
                .map(|i| VideoSegment::new(format!("{i}.mp4"), i as f64, i as f64 + 3.0))
                .collect();
            let cmd = merge(&segments);
            let graph = cmd.graph().unwrap();

            assert_eq!(graph.filters_named("trim").count(), n);
            assert_eq!(graph.filters_named("setpts").count(), n);
            assert_eq!(graph.filters_named("atrim").count(), n);
            assert_eq!(graph.filters_named("asetpts").count(), n);
            assert_eq!(graph.filters_named("concat").count(), 1);

            let concat = graph.chains.last().unwrap();
            let expected: Vec<StreamRef> = (0..n)
                .flat_map(|i| {
                    [
                        StreamRef::label(format!("v{i}")),
                        StreamRef::label(format!("a{i}")),
                    ]
                })
                .collect();
            assert_eq!(concat.inputs, expected);

            let inputs: Vec<_> = cmd.inputs().iter().map(|i| i.path.clone()).collect();
            let paths: Vec<_> = (0..n).map(|i| format!("{i}.mp4").into()).collect::<Vec<std::path::PathBuf>>();
            assert_eq!(inputs, paths);
        }
    }

    #[test]
    fn test_unbounded_end_omits_upper_limit() {
        let cmd = merge(&[
            VideoSegment::new("a.mp4", 3.0, 0.0),
            VideoSegment::new("b.mp4", 0.0, -1.0),
        ]);
        let graph = cmd.graph().unwrap();
        for trim in graph.filters_named("trim").chain(graph.filters_named("atrim")) {
            assert_eq!(trim.get("end"), None);
        }
        assert!(graph.to_string().starts_with("[0:v]trim=start=3.00,setpts=PTS-STARTPTS[v0]"));
        assert!(graph.to_string().contains("[1:v]trim=start=0.00,setpts=PTS-STARTPTS[v1]"));
    }

    #[test]
    fn test_empty_path_rejected() {
        let err = build_merge(
            &[VideoSegment::new("a.mp4", 0.0, 1.0), VideoSegment::new("", 0.0, 1.0)],
            Path::new("out.mp4"),
            &EncodingConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("segments[1].file_path"));
    }
}
