//! Where generated text goes.
//!
//! [`Output`] is the configured destination of a generator. During a run it
//! is opened into a [`Sink`], which owns the destination for exactly that run
//! and releases it when dropped, whether the run finished or failed.

use std::fs::File;
use std::io::{self, BufWriter, StdoutLock, Write};

use camino::Utf8PathBuf;

use crate::error::Error;

/// The destination configured on a generator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Output {
    /// The process standard output.
    #[default]
    Stdout,
    /// An in-memory buffer; its text is returned from `generate`.
    String,
    /// A file, created (or truncated) at the start of the run.
    File(Utf8PathBuf),
}

/// The destination of one run.
pub(crate) enum Sink<'a> {
    Stdout(StdoutLock<'static>),
    Buffer(String),
    File {
        path: Utf8PathBuf,
        writer: BufWriter<File>,
    },
    Writer(&'a mut dyn Write),
}

impl<'a> Sink<'a> {
    pub(crate) fn open(output: &Output) -> Result<Self, Error> {
        let sink = match output {
            Output::Stdout => Sink::Stdout(io::stdout().lock()),
            Output::String => Sink::Buffer(String::new()),
            Output::File(path) => {
                let file = File::create(path).map_err(|err| Error::io(path.as_str(), err))?;
                tracing::debug!(%path, "opened output file");

                Sink::File {
                    path: path.clone(),
                    writer: BufWriter::new(file),
                }
            }
        };

        Ok(sink)
    }

    pub(crate) fn borrowed(writer: &'a mut dyn Write) -> Self {
        Sink::Writer(writer)
    }

    pub(crate) fn write(&mut self, text: &str) -> Result<(), Error> {
        let result = match self {
            Sink::Buffer(buffer) => {
                buffer.push_str(text);
                Ok(())
            }
            Sink::Stdout(lock) => lock.write_all(text.as_bytes()),
            Sink::File { writer, .. } => writer.write_all(text.as_bytes()),
            Sink::Writer(writer) => writer.write_all(text.as_bytes()),
        };

        result.map_err(|err| Error::io(self.label(), err))
    }

    /// Writes `text` the way `puts` does: a newline is added unless the text
    /// already ends with one.
    pub(crate) fn write_line(&mut self, text: &str) -> Result<(), Error> {
        self.write(text)?;

        if !text.ends_with('\n') {
            self.write("\n")?;
        }

        Ok(())
    }

    /// Flushes and closes the sink. Buffered text is handed back.
    pub(crate) fn finish(self) -> Result<Option<String>, Error> {
        let label = self.label();

        match self {
            Sink::Buffer(buffer) => Ok(Some(buffer)),
            Sink::Stdout(mut lock) => lock.flush().map(|_| None),
            Sink::Writer(writer) => writer.flush().map(|_| None),
            Sink::File { path, writer } => {
                let result = writer
                    .into_inner()
                    .map_err(io::IntoInnerError::into_error)
                    .and_then(|file| file.sync_all());
                tracing::debug!(%path, "closed output file");
                result.map(|_| None)
            }
        }
        .map_err(|err| Error::io(label, err))
    }

    fn label(&self) -> String {
        match self {
            Sink::Stdout(_) => "<stdout>".to_string(),
            Sink::Buffer(_) => "<buffer>".to_string(),
            Sink::File { path, .. } => path.to_string(),
            Sink::Writer(_) => "<writer>".to_string(),
        }
    }
}
