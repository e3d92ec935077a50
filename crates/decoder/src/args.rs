//! Argument templating for external decoder programs.
//!
//! Each argument is an [upon] template rendered once per invocation. The
//! template syntax follows upon's Mustache-like conventions
//! (`{{ variable }}`), with the following variables available:
//!
//! | Variable     | Description                                          |
//! |--------------|------------------------------------------------------|
//! | `input`      | Absolute path of the staged container file           |
//! | `output_dir` | Directory the decoder should write its artifact into |
//! | `basename`   | File name of `input` without its final extension     |
//!
//! ```
//! use decant_decoder::ArgsTemplate;
//! use std::path::Path;
//!
//! let args = ArgsTemplate::new(["{{ input }}", "-o", "{{ output_dir }}"]).unwrap();
//! let rendered = args.render(Path::new("/tmp/s/Song.ncm"), Path::new("/tmp/s")).unwrap();
//! assert_eq!(rendered, ["/tmp/s/Song.ncm", "-o", "/tmp/s"]);
//! ```

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::path::Path;
use upon::{Engine, Template};

/// Rendered in place of `input` while checking that some argument uses it.
const INPUT_PROBE: &str = "\u{1}decant-input\u{1}";

/// A compiled list of argument templates.
///
/// Templates are compiled eagerly in [`new()`](Self::new) so that syntax
/// errors surface when the decoder is constructed rather than on the first
/// item of a batch.
pub struct ArgsTemplate {
    engine: Engine<'static>,
    templates: Vec<Template<'static>>,
}
impl ArgsTemplate {
    pub fn new(args: impl IntoIterator<Item = impl AsRef<str>>) -> Result<Self> {
        let engine = Engine::new();
        let templates = args
            .into_iter()
            .map(|arg| engine.compile(arg.as_ref().to_string()).or_raise(|| ErrorKind::Template))
            .collect::<Result<Vec<_>>>()?;
        let args = Self { engine, templates };
        // A decoder that is never told which file to decode cannot work.
        let probe = args.render_values(INPUT_PROBE, "", "")?;
        if !probe.iter().any(|arg| arg.contains(INPUT_PROBE)) {
            exn::bail!(ErrorKind::MissingInput);
        }
        Ok(args)
    }

    /// Render every argument for one decode invocation.
    pub fn render(&self, input: &Path, output_dir: &Path) -> Result<Vec<String>> {
        let basename = input.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        self.render_values(&input.to_string_lossy(), &output_dir.to_string_lossy(), &basename)
    }

    fn render_values(&self, input: &str, output_dir: &str, basename: &str) -> Result<Vec<String>> {
        self.templates
            .iter()
            .map(|template| {
                template
                    .render(
                        &self.engine,
                        upon::value! {
                            input: input,
                            output_dir: output_dir,
                            basename: basename,
                        },
                    )
                    .to_string()
                    .or_raise(|| ErrorKind::Template)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
impl std::fmt::Debug for ArgsTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArgsTemplate").field("len", &self.templates.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&["{{ input }}"], &["/scratch/Song.ncm"])]
    #[case(&["{{ input }}", "-o", "{{ output_dir }}"], &["/scratch/Song.ncm", "-o", "/scratch"])]
    #[case(&["--in={{ input }}", "--name={{ basename }}.mp3"], &["--in=/scratch/Song.ncm", "--name=Song.mp3"])]
    #[case(&["-c", "run \"$0\"", "{{input}}"], &["-c", "run \"$0\"", "/scratch/Song.ncm"])]
    fn test_renders_arguments(#[case] templates: &[&str], #[case] expected: &[&str]) {
        let args = ArgsTemplate::new(templates).unwrap();
        let rendered = args.render(Path::new("/scratch/Song.ncm"), Path::new("/scratch")).unwrap();
        assert_eq!(rendered, expected);
    }

    #[rstest]
    #[case(&["{{ input "])]
    #[case(&["{{ input }}", "{% if %}"])]
    fn test_rejects_bad_syntax(#[case] templates: &[&str]) {
        let err = ArgsTemplate::new(templates).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Template));
    }

    #[rstest]
    #[case(&[])]
    #[case(&["-o", "{{ output_dir }}"])]
    #[case(&["{{ basename }}"])]
    fn test_requires_input(#[case] templates: &[&str]) {
        let err = ArgsTemplate::new(templates).unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingInput));
    }

    #[test]
    fn test_unknown_variable_is_rejected() {
        let err = ArgsTemplate::new(["{{ input }}", "{{ nonsense }}"]).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Template));
    }
}
