//! Typed FFmpeg filter graph.
//!
//! Builders assemble [`FilterGraph`] values out of chains and filters; the
//! textual `-filter_complex` syntax is produced only by the `Display` impls.

use std::fmt;

/// Stream type selector of an input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Video => "v",
            StreamKind::Audio => "a",
        }
    }
}

/// A pad in the filter graph: an input stream or a named label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamRef {
    Input { index: usize, kind: StreamKind },
    Label(String),
}

impl StreamRef {
    /// Video stream of input `index` (`[i:v]`).
    pub fn video(index: usize) -> Self {
        Self::Input {
            index,
            kind: StreamKind::Video,
        }
    }

    /// Audio stream of input `index` (`[i:a]`).
    pub fn audio(index: usize) -> Self {
        Self::Input {
            index,
            kind: StreamKind::Audio,
        }
    }

    /// Named label (`[name]`).
    pub fn label(name: impl Into<String>) -> Self {
        Self::Label(name.into())
    }

    /// Form used with `-map`.
    pub fn map_spec(&self) -> String {
        match self {
            StreamRef::Input { index, kind } => format!("{}:{}", index, kind.as_str()),
            StreamRef::Label(_) => self.to_string(),
        }
    }
}

impl fmt::Display for StreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamRef::Input { index, kind } => write!(f, "[{}:{}]", index, kind.as_str()),
            StreamRef::Label(name) => write!(f, "[{}]", name),
        }
    }
}

/// A single filter argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterArg {
    Positional(String),
    Named { key: String, value: String },
}

impl fmt::Display for FilterArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterArg::Positional(value) => f.write_str(value),
            FilterArg::Named { key, value } => write!(f, "{}={}", key, value),
        }
    }
}

/// A filter with its arguments, e.g. `trim=start=0.00:end=10.00`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub name: String,
    pub args: Vec<FilterArg>,
}

impl Filter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(FilterArg::Positional(value.into()));
        self
    }

    /// Append a `key=value` argument.
    pub fn kv(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.args.push(FilterArg::Named {
            key: key.into(),
            value: value.to_string(),
        });
        self
    }

    /// Value of a named argument, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.args.iter().find_map(|a| match a {
            FilterArg::Named { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            f.write_str(if i == 0 { "=" } else { ":" })?;
            write!(f, "{}", arg)?;
        }
        Ok(())
    }
}

/// Filters applied in sequence between input and output pads.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterChain {
    pub inputs: Vec<StreamRef>,
    pub filters: Vec<Filter>,
    pub outputs: Vec<StreamRef>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, stream: StreamRef) -> Self {
        self.inputs.push(stream);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn output(mut self, stream: StreamRef) -> Self {
        self.outputs.push(stream);
        self
    }

    /// Whether the chain contains a filter with this name.
    pub fn has_filter(&self, name: &str) -> bool {
        self.filters.iter().any(|f| f.name == name)
    }
}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for input in &self.inputs {
            write!(f, "{}", input)?;
        }
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", filter)?;
        }
        for output in &self.outputs {
            write!(f, "{}", output)?;
        }
        Ok(())
    }
}

/// A complete `-filter_complex` graph.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterGraph {
    pub chains: Vec<FilterChain>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chain: FilterChain) {
        self.chains.push(chain);
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// All filters with the given name, in graph order.
    pub fn filters_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Filter> + 'a {
        self.chains
            .iter()
            .flat_map(|c| c.filters.iter())
            .filter(move |f| f.name == name)
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chain) in self.chains.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}", chain)?;
        }
        Ok(())
    }
}

/// Format a time value in seconds.
pub fn secs(value: f64) -> String {
    format!("{:.2}", value)
}

/// Wrap an expression in single quotes so commas survive graph parsing.
pub fn quoted(expr: impl AsRef<str>) -> String {
    format!("'{}'", expr.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_ref_display() {
        assert_eq!(StreamRef::video(0).to_string(), "[0:v]");
        assert_eq!(StreamRef::audio(2).to_string(), "[2:a]");
        assert_eq!(StreamRef::label("outv").to_string(), "[outv]");
        assert_eq!(StreamRef::video(0).map_spec(), "0:v");
        assert_eq!(StreamRef::label("aout").map_spec(), "[aout]");
    }

    #[test]
    fn test_filter_display() {
        assert_eq!(Filter::new("setpts").arg("PTS-STARTPTS").to_string(), "setpts=PTS-STARTPTS");
        assert_eq!(
            Filter::new("trim").kv("start", secs(0.0)).kv("end", secs(10.0)).to_string(),
            "trim=start=0.00:end=10.00"
        );
        assert_eq!(Filter::new("null").to_string(), "null");
    }

    #[test]
    fn test_graph_display() {
        let mut graph = FilterGraph::new();
        graph.push(
            FilterChain::new()
                .input(StreamRef::video(0))
                .filter(Filter::new("trim").kv("start", secs(5.0)))
                .filter(Filter::new("setpts").arg("PTS-STARTPTS"))
                .output(StreamRef::label("v0")),
        );
        graph.push(
            FilterChain::new()
                .input(StreamRef::label("v0"))
                .filter(Filter::new("null"))
                .output(StreamRef::label("outv")),
        );
        assert_eq!(
            graph.to_string(),
            "[0:v]trim=start=5.00,setpts=PTS-STARTPTS[v0];[v0]null[outv]"
        );
        assert_eq!(graph.filters_named("trim").count(), 1);
    }

    #[test]
    fn test_filter_get() {
        let f = Filter::new("afade").kv("t", "out").kv("st", secs(28.0));
        assert_eq!(f.get("st"), Some("28.00"));
        assert_eq!(f.get("d"), None);
    }
}
