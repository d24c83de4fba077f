//! Whole-file concatenation through the concat demuxer.

use std::path::{Path, PathBuf};

use vforge_models::EncodingConfig;

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};

/// Render a concat demuxer list, one `file '<path>'` line per input.
pub fn concat_list(paths: &[PathBuf]) -> MediaResult<String> {
    let mut list = String::new();
    for path in paths {
        let path = path.to_str().ok_or_else(|| {
            MediaError::validation(format!("Path is not valid UTF-8: {}", path.display()))
        })?;
        list.push_str("file '");
        list.push_str(&path.replace('\'', "'\\''"));
        list.push_str("'\n");
    }
    Ok(list)
}

/// Build the command concatenating the files listed in `list_file`.
pub fn build_concat(list_file: &Path, output: &Path, encoding: &EncodingConfig) -> FfmpegCommand {
    FfmpegCommand::new(output)
        .input_with_args(["-f", "concat", "-safe", "0"], list_file)
        .encoding(encoding)
}

/// Build a stream-copy pass from `input` to `output`.
pub fn build_copy(input: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(output).input(input).stream_copy()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(&[
            PathBuf::from("/tmp/a.mp4"),
            PathBuf::from("/tmp/it's here.mp4"),
        ])
        .unwrap();
        assert_eq!(list, "file '/tmp/a.mp4'\nfile '/tmp/it'\\''s here.mp4'\n");
    }

    #[test]
    fn test_concat_command() {
        let args = build_concat(Path::new("/tmp/list.txt"), Path::new("/out/c.mp4"), &EncodingConfig::default())
            .build_args();
        let i = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(&args[i..i + 6], ["-f", "concat", "-safe", "0", "-i", "/tmp/list.txt"]);
        assert!(args.windows(2).any(|w| w[0] == "-c:v" && w[1] == "libx264"));
    }
}
