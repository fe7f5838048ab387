use std::{fs, path::PathBuf, process::ExitCode};

use anyhow::Context;
use clap::{ArgAction, Parser, ValueEnum};
use codesnake::{Block, CodeWidth, Label, LineIndex};
use pl0::{generate, parse_source, CompileError, CompileOptions, Instruction, Span};
use rustyline::error::ReadlineError;
use tracing::level_filters::LevelFilter;
use yansi::Paint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// numbered instruction listing
    Code,
    /// the parse tree in s-expression notation
    Tree,
}

/// Compile PL/0 programs to stack machine code.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Program to compile. Starts an interactive session when omitted.
    file: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Emit::Code)]
    emit: Emit,
    /// Address of the first variable in every activation frame
    #[arg(long, default_value_t = 0)]
    frame_base: u32,
    /// Accept keywords and identifiers in any case
    #[arg(long)]
    fold_case: bool,
    /// Log compiler internals to stderr (-v for blocks, -vv for every instruction)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

struct Session {
    options: CompileOptions,
    emit: Emit,
}

fn listing(code: &[Instruction]) -> String {
    let width = code.len().saturating_sub(1).to_string().len();
    code.iter()
        .enumerate()
        .map(|(address, instruction)| {
            format!("{}  {instruction}", format!("{address:>width$}").dim())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// codesnake cannot label an empty range, so widen it over the previous char
fn visible(source: &str, span: Span) -> Span {
    if !span.is_empty() {
        return span;
    }
    let start = source
        .get(..span.start)
        .and_then(|before| before.char_indices().next_back())
        .map_or(span.start, |(idx, _)| idx);
    start..span.end
}

fn report(name: &str, source: &str, error: &CompileError) {
    let CompileError::Syntax(syntax) = error else {
        eprintln!("{}: {error}", "error".red().bold());
        return;
    };

    let idx = LineIndex::new(source);
    let label = Label::new(visible(source, syntax.span()))
        .with_text(syntax.to_string().red().to_string())
        .with_style(|s| s.red().to_string());
    match Block::new(&idx, [label]) {
        Some(block) => {
            let block = block.map_code(|c| CodeWidth::new(c, c.len()));
            eprintln!("{}[{name}]", block.prologue());
            eprint!("{block}");
            eprintln!("{}", block.epilogue());
        }
        None => eprintln!("{}: {error}", "error".red().bold()),
    }
}

impl Session {
    fn output(&self, source: &str) -> Result<String, CompileError> {
        let tree = parse_source(source)?;
        match self.emit {
            Emit::Tree => Ok(format!("{tree:#}")),
            Emit::Code => Ok(listing(&generate(&tree, &self.options)?)),
        }
    }

    /// Compiles one program, printing the result or the error.
    fn run(&self, name: &str, source: &str) -> bool {
        tracing::debug!(name, bytes = source.len(), "compiling");
        let source = self.options.prepare(source);
        match self.output(&source) {
            Ok(output) => {
                println!("{output}");
                true
            }
            Err(error) => {
                report(name, &source, &error);
                false
            }
        }
    }

    fn interactive(&self) -> anyhow::Result<()> {
        let mut editor = rustyline::DefaultEditor::new()?;
        let mut buffer = String::new();

        loop {
            let prompt = if buffer.is_empty() { ">> " } else { ".. " };
            let line = match editor.readline(prompt) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => {
                    buffer.clear();
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            };
            editor.add_history_entry(line.as_str())?;
            buffer.push_str(&line);
            buffer.push('\n');

            // a program is complete once a line ends in the final `.`
            if line.trim_end().ends_with('.') {
                let source = std::mem::take(&mut buffer);
                self.run("repl", &source);
            }
        }

        Ok(())
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let session = Session {
        options: CompileOptions {
            frame_base: args.frame_base,
            fold_case: args.fold_case,
        },
        emit: args.emit,
    };

    match &args.file {
        Some(path) => {
            let source = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let compiled = session.run(&path.display().to_string(), &source);
            Ok(if compiled {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        None => {
            session.interactive()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
