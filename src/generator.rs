use std::fs;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::{Error, Result, describe};
use crate::output::{Output, Sink};
use crate::render::{MAX_SAFETY, MiniJinjaRenderer, TemplateRenderer};
use crate::report::settle;
use crate::scope::{ExecutionScope, LoadError};
use crate::task::{STDIN, Task, TaskKind};
use crate::trim::{TrimConfig, TrimLevel, TrimMode};

/// An ordered queue of tasks run against one shared scope.
///
/// Tasks run strictly in the order they were added. Each call to
/// [`Generator::generate`] starts from a fresh [`ExecutionScope`], so nothing
/// leaks between runs or between generators.
///
/// # Example
///
/// ```rust,no_run
/// use rube::{Generator, Output};
///
/// let mut rube = Generator::new();
/// rube.set_output(Output::String);
/// rube.add_task("eval", "{% set b = 'foo' %}")?
///     .add_task("template", "page.j2")?;
///
/// let text = rube.generate()?;
/// # Ok::<(), rube::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Generator<R: TemplateRenderer = MiniJinjaRenderer> {
    tasks: Vec<Task>,
    trim: TrimConfig,
    safety: Option<u8>,
    output: Output,
    library_paths: Vec<Utf8PathBuf>,
    from_command_line: bool,
    renderer: R,
}

impl Generator<MiniJinjaRenderer> {
    pub fn new() -> Self {
        Self::with_renderer(MiniJinjaRenderer)
    }
}

impl Default for Generator<MiniJinjaRenderer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: TemplateRenderer> Generator<R> {
    /// Creates an empty generator that renders templates with `renderer`.
    pub fn with_renderer(renderer: R) -> Self {
        Self {
            tasks: Vec::new(),
            trim: TrimConfig::default(),
            safety: None,
            output: Output::default(),
            library_paths: vec![Utf8PathBuf::from(".")],
            from_command_line: false,
            renderer,
        }
    }

    /// Queues a task by kind name: `require`, `eval` or `template`.
    pub fn add_task(&mut self, kind: &str, value: impl Into<String>) -> Result<&mut Self> {
        let kind: TaskKind = kind.parse()?;
        Ok(self.push(Task::new(kind, value)))
    }

    pub fn push(&mut self, task: Task) -> &mut Self {
        self.tasks.push(task);
        self
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn set_tasks(&mut self, tasks: Vec<Task>) -> &mut Self {
        self.tasks = tasks;
        self
    }

    pub fn trim_level(&self) -> TrimLevel {
        self.trim.level()
    }

    /// Sets the trim level from its textual (or numeric) form. An invalid
    /// level leaves the current settings untouched.
    pub fn set_trim_level(&mut self, level: impl ToString) -> Result<&mut Self> {
        let level: TrimLevel = level.to_string().parse()?;
        self.trim.set_level(level);
        Ok(self)
    }

    pub fn disable_percent(&self) -> bool {
        self.trim.percent_disabled()
    }

    pub fn set_disable_percent(&mut self, disabled: bool) -> &mut Self {
        self.trim.set_percent_disabled(disabled);
        self
    }

    /// The trim mode derived from the current level and percent setting.
    pub fn trim_mode(&self) -> &TrimMode {
        self.trim.mode()
    }

    pub fn safety(&self) -> Option<u8> {
        self.safety
    }

    pub fn set_safety(&mut self, safety: Option<u8>) -> Result<&mut Self> {
        if let Some(level) = safety.filter(|level| *level > MAX_SAFETY) {
            return Err(Error::BadArgument(format!(
                "Invalid --safe level {level}. Should be 0..{MAX_SAFETY}"
            )));
        }

        self.safety = safety;
        Ok(self)
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    pub fn set_output(&mut self, output: Output) -> &mut Self {
        self.output = output;
        self
    }

    pub fn library_paths(&self) -> &[Utf8PathBuf] {
        &self.library_paths
    }

    /// Adds a directory to search when requiring libraries by relative path.
    pub fn add_library_path(&mut self, dir: impl Into<Utf8PathBuf>) -> &mut Self {
        self.library_paths.push(dir.into());
        self
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn from_command_line(&self) -> bool {
        self.from_command_line
    }

    /// When set, errors from [`Generator::generate`] are printed and end the
    /// process instead of being returned.
    pub fn set_from_command_line(&mut self, from_command_line: bool) -> &mut Self {
        self.from_command_line = from_command_line;
        self
    }

    /// Runs every task against a fresh scope, writing to the configured
    /// output. Returns the generated text when the output is
    /// [`Output::String`], otherwise `None`.
    pub fn generate(&self) -> Result<Option<String>> {
        let result = Sink::open(&self.output).and_then(|mut sink| {
            let run = self.run(&mut sink);
            let finished = sink.finish();
            run.and(finished)
        });

        settle(result, self.from_command_line)
    }

    /// Runs every task against a fresh scope, writing to `out` instead of
    /// the configured output. `out` is flushed even when a task fails.
    pub fn generate_to(&self, out: &mut dyn Write) -> Result<()> {
        let mut sink = Sink::borrowed(out);
        let run = self.run(&mut sink);
        let result = run.and(sink.finish().map(|_| ()));

        settle(result, self.from_command_line)
    }

    fn run(&self, sink: &mut Sink<'_>) -> Result<()> {
        let span = tracing::info_span!("generate", tasks = self.tasks.len());
        let _enter = span.enter();

        let mut scope = ExecutionScope::with_library_paths(self.library_paths.clone());

        for (index, task) in self.tasks.iter().enumerate() {
            let _task = tracing::debug_span!("task", index, kind = %task.kind()).entered();
            self.execute(&mut scope, sink, task)?;
        }

        tracing::debug!(bindings = scope.names().count(), "finished tasks");

        Ok(())
    }

    fn execute(&self, scope: &mut ExecutionScope, sink: &mut Sink<'_>, task: &Task) -> Result<()> {
        match task {
            Task::Require(path) => self.require(scope, path),
            Task::Eval(code) => self.eval(scope, sink, code),
            Task::Template(path) => self.template(scope, sink, path),
        }
    }

    fn require(&self, scope: &mut ExecutionScope, path: &str) -> Result<()> {
        match scope.load_library(path) {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!(library = path, "skipping repeated require");
                Ok(())
            }
            Err(LoadError::NotFound(path)) => Err(Error::MissingRequire(path)),
            Err(LoadError::Io { path, source }) => Err(Error::io(path.as_str(), source)),
            Err(LoadError::Script { path, source }) => Err(Error::Library {
                path,
                message: describe(&source),
            }),
        }
    }

    fn eval(&self, scope: &mut ExecutionScope, sink: &mut Sink<'_>, code: &str) -> Result<()> {
        let output = scope
            .evaluate(code)
            .map_err(|err| Error::script(code, &err))?;

        sink.write(&output)
    }

    fn template(&self, scope: &mut ExecutionScope, sink: &mut Sink<'_>, path: &str) -> Result<()> {
        let (name, source) = if path == STDIN {
            let source = io::read_to_string(io::stdin()).map_err(|err| Error::io("<stdin>", err))?;
            ("<stdin>", source)
        } else {
            if !Utf8Path::new(path).is_file() {
                return Err(Error::MissingTemplate(path.to_string()));
            }
            let source = fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
            (path, source)
        };

        tracing::debug!(template = name, mode = %self.trim.mode(), "rendering template");

        let rendered = self
            .renderer
            .render(scope, name, &source, self.trim.mode(), self.safety)
            .map_err(|err| Error::Template {
                path: name.to_string(),
                message: describe(&err),
            })?;

        sink.write_line(&rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A writer that remembers whether it was flushed.
    #[derive(Default)]
    struct Flushing {
        data: Vec<u8>,
        flushed: bool,
    }

    impl Write for Flushing {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.flushed = false;
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushed = true;
            Ok(())
        }
    }

    fn write(dir: &tempfile::TempDir, name: &str, text: &str) -> String {
        let path = dir.path().join(name);
        fs::write(&path, text).unwrap();
        path.to_str().unwrap().to_string()
    }

    fn to_string() -> Generator {
        let mut rube = Generator::new();
        rube.set_output(Output::String);
        rube
    }

    #[test]
    fn starts_empty_with_defaults() {
        let rube = Generator::new();

        assert!(rube.tasks().is_empty());
        assert_eq!(rube.trim_level(), TrimLevel::Zero);
        assert_eq!(rube.trim_mode().as_str(), "%");
        assert!(!rube.disable_percent());
        assert_eq!(rube.safety(), None);
        assert_eq!(rube.output(), &Output::Stdout);
        assert!(!rube.from_command_line());
    }

    #[test]
    fn adds_tasks_in_order() {
        let mut rube = Generator::new();
        rube.add_task("require", "foo")
            .unwrap()
            .add_task("eval", "bar")
            .unwrap()
            .add_task("template", "baz")
            .unwrap()
            .add_task("eval", "bar")
            .unwrap();

        assert_eq!(
            rube.tasks(),
            &[
                Task::Require("foo".into()),
                Task::Eval("bar".into()),
                Task::Template("baz".into()),
                Task::Eval("bar".into()),
            ]
        );
    }

    #[test]
    fn rejects_unknown_task_kinds() {
        let mut rube = Generator::new();

        assert!(matches!(
            rube.add_task("foo", "bar"),
            Err(Error::InvalidTaskType(_))
        ));
        assert!(rube.tasks().is_empty());
    }

    #[test]
    fn task_assignment_replaces_the_queue() {
        let mut rube = Generator::new();
        rube.add_task("eval", "old").unwrap();
        rube.set_tasks(vec![Task::Eval("foo".into()), Task::Template("baz".into())]);

        assert_eq!(rube.tasks().len(), 2);
        assert_eq!(rube.tasks()[0], Task::Eval("foo".into()));
    }

    #[test]
    fn trim_settings_keep_mode_in_sync() {
        let mut rube = Generator::new();

        rube.set_trim_level(1).unwrap();
        assert_eq!(rube.trim_level(), TrimLevel::One);
        assert_eq!(rube.trim_mode().as_str(), "%>");

        rube.set_disable_percent(true);
        assert_eq!(rube.trim_mode().as_str(), ">");

        rube.set_trim_level("-").unwrap();
        assert_eq!(rube.trim_mode().as_str(), "-");

        rube.set_trim_level("").unwrap();
        assert_eq!(rube.trim_level(), TrimLevel::Zero);
        assert_eq!(rube.trim_mode().as_str(), "");
    }

    #[test]
    fn invalid_trim_level_changes_nothing() {
        let mut rube = Generator::new();
        rube.set_trim_level("2").unwrap();

        assert!(matches!(
            rube.set_trim_level("foo"),
            Err(Error::BadArgument(_))
        ));
        assert_eq!(rube.trim_level(), TrimLevel::Two);
        assert_eq!(rube.trim_mode().as_str(), "%<>");
    }

    #[test]
    fn safety_is_limited_to_known_levels() {
        let mut rube = Generator::new();

        rube.set_safety(Some(4)).unwrap();
        assert_eq!(rube.safety(), Some(4));

        match rube.set_safety(Some(5)) {
            Err(Error::BadArgument(msg)) => assert_eq!(msg, "Invalid --safe level 5. Should be 0..4"),
            other => panic!("expected BadArgument, got {other:?}"),
        }
        assert_eq!(rube.safety(), Some(4));
    }

    #[test]
    fn empty_queue_generates_nothing() {
        assert_eq!(to_string().generate().unwrap().as_deref(), Some(""));
    }

    #[test]
    fn eval_output_goes_to_the_buffer() {
        let mut rube = to_string();
        rube.add_task("eval", "{{ 'foo' }}\n").unwrap();

        assert_eq!(rube.generate().unwrap().as_deref(), Some("foo\n"));
    }

    #[test]
    fn eval_output_goes_to_an_explicit_writer() {
        let mut rube = Generator::new();
        rube.add_task("eval", "{{ 'foo' }}\n").unwrap();

        let mut out = Vec::new();
        rube.generate_to(&mut out).unwrap();
        assert_eq!(out, b"foo\n");
    }

    #[test]
    fn explicit_writer_is_flushed_when_a_task_fails() {
        let mut rube = Generator::new();
        rube.add_task("eval", "before\n")
            .unwrap()
            .add_task("template", "missing.tmpl")
            .unwrap();

        let mut out = Flushing::default();
        assert!(matches!(
            rube.generate_to(&mut out),
            Err(Error::MissingTemplate(_))
        ));
        assert_eq!(out.data, b"before\n");
        assert!(out.flushed);
    }

    #[test]
    fn eval_output_goes_to_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("out.txt")).unwrap();

        let mut rube = Generator::new();
        rube.set_output(Output::File(path.clone()));
        rube.add_task("eval", "{{ 'foo' }}\n").unwrap();

        assert_eq!(rube.generate().unwrap(), None);
        assert_eq!(fs::read_to_string(&path).unwrap(), "foo\n");
    }

    #[test]
    fn variables_persist_into_templates() {
        let dir = tempfile::tempdir().unwrap();
        let template = write(&dir, "test2", "bar\n{{ b }}*2");

        let mut rube = to_string();
        rube.add_task("eval", "{% set b = 'foo' %}")
            .unwrap()
            .add_task("template", template)
            .unwrap();

        assert_eq!(rube.generate().unwrap().as_deref(), Some("bar\nfoo*2\n"));
    }

    #[test]
    fn templates_are_rendered_with_the_trim_mode() {
        let dir = tempfile::tempdir().unwrap();
        let template = write(&dir, "test1", "a\n  {% if true %}\nb\n  {% endif %}\nc\n");

        let cases = [
            ("0", "a\n  \nb\n  \nc\n"),
            ("1", "a\n  b\n  c\n"),
            ("2", "a\nb\nc\n"),
            ("-", "a\n  \nb\n  \nc\n"),
        ];

        for (level, expected) in cases {
            let mut rube = to_string();
            rube.set_trim_level(level).unwrap();
            rube.add_task("template", template.clone()).unwrap();

            assert_eq!(
                rube.generate().unwrap().as_deref(),
                Some(expected),
                "trim level {level}"
            );
        }
    }

    #[test]
    fn disabled_percent_leaves_percent_lines_alone() {
        let dir = tempfile::tempdir().unwrap();
        let template = write(
            &dir,
            "percent",
            "% set z = 'farb'\n{% if z is defined %}{{ z }}{% else %}barf{% endif %}\n",
        );

        let mut rube = to_string();
        rube.add_task("template", template.clone()).unwrap();
        let output = rube.generate().unwrap().unwrap();
        assert!(output.contains("farb"));
        assert!(!output.contains("% set"));

        rube.set_disable_percent(true);
        assert_eq!(
            rube.generate().unwrap().as_deref(),
            Some("% set z = 'farb'\nbarf\n")
        );
    }

    #[test]
    fn required_libraries_share_the_scope() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir,
            "helpers.j2",
            "{% macro shout(s) %}{{ s | upper }}!{% endmacro %}{% set greeting = 'hi' %}",
        );
        let template = write(&dir, "page", "{{ shout(greeting) }}");

        let mut rube = to_string();
        rube.add_library_path(Utf8Path::from_path(dir.path()).unwrap())
            .add_task("require", "helpers")
            .unwrap()
            .add_task("template", template)
            .unwrap();

        assert_eq!(rube.generate().unwrap().as_deref(), Some("HI!\n"));
    }

    #[test]
    fn missing_require_fails() {
        let mut rube = to_string();
        rube.add_task("require", "nonexistent-lib").unwrap();

        match rube.generate() {
            Err(Error::MissingRequire(path)) => assert_eq!(path, "nonexistent-lib"),
            other => panic!("expected MissingRequire, got {other:?}"),
        }
    }

    #[test]
    fn missing_template_fails() {
        let mut rube = to_string();
        rube.add_task("template", "missing.tmpl").unwrap();

        match rube.generate() {
            Err(Error::MissingTemplate(path)) => assert_eq!(path, "missing.tmpl"),
            other => panic!("expected MissingTemplate, got {other:?}"),
        }
    }

    #[test]
    fn failing_eval_reports_its_source() {
        let mut rube = to_string();
        rube.add_task("eval", "{{ foo }}").unwrap();

        let err = rube.generate().unwrap_err();
        assert!(matches!(err, Error::Script { .. }));
        assert!(err.to_string().contains("{{ foo }}"));
    }

    #[test]
    fn broken_template_is_a_template_error() {
        let dir = tempfile::tempdir().unwrap();
        let template = write(&dir, "broken", "{{ nope }}");

        let mut rube = to_string();
        rube.add_task("template", template.clone()).unwrap();

        match rube.generate() {
            Err(Error::Template { path, .. }) => assert_eq!(path, template),
            other => panic!("expected Template, got {other:?}"),
        }
    }

    #[test]
    fn failure_stops_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("out.txt")).unwrap();

        let mut rube = Generator::new();
        rube.set_output(Output::File(path.clone()));
        rube.add_task("eval", "before\n")
            .unwrap()
            .add_task("template", "missing.tmpl")
            .unwrap()
            .add_task("eval", "after\n")
            .unwrap();

        assert!(matches!(rube.generate(), Err(Error::MissingTemplate(_))));

        // The file was released on failure and holds only what ran before it.
        assert_eq!(fs::read_to_string(&path).unwrap(), "before\n");
    }

    #[test]
    fn generator_is_reusable_after_failure() {
        let mut rube = to_string();
        rube.add_task("eval", "{{ foo }}").unwrap();
        assert!(rube.generate().is_err());

        rube.set_tasks(vec![Task::Eval("ok".into())]);
        assert_eq!(rube.generate().unwrap().as_deref(), Some("ok"));
    }

    #[test]
    fn runs_do_not_share_scope() {
        let mut first = to_string();
        first.add_task("eval", "{% set b = 'foo' %}{{ b }}").unwrap();

        let mut second = to_string();
        second.add_task("eval", "{{ b }}").unwrap();

        assert_eq!(first.generate().unwrap().as_deref(), Some("foo"));
        assert!(matches!(second.generate(), Err(Error::Script { .. })));

        // A second run of the same generator starts from scratch as well.
        first.set_tasks(vec![Task::Eval("{{ b }}".into())]);
        assert!(matches!(first.generate(), Err(Error::Script { .. })));
    }
}
