use datatest_stable::Utf8Path;
use pl0::{
    compiler::bytecode::parse_listing, compile, parse_source, CompileOptions, ParseTree, Token,
};

#[derive(thiserror::Error, Debug)]
#[error("mismatch(es) in frontend datatest at {0}")]
pub struct DatatestError(Box<Utf8Path>);

/// A test file is an error section, `---`, an expected output section, `---`,
/// then the PL/0 source. Lines starting with `;` outside the source are
/// comments and survive regeneration.
struct Datatest<'a> {
    errors: Vec<&'a str>,
    expected: Vec<&'a str>,
    source: String,
    // (line index, text)
    comments: Vec<(usize, &'a str)>,
    error_lines: usize,
    expected_lines: usize,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
enum Section {
    Errors,
    Expected,
    Source,
}

fn read_datatest(contents: &str) -> Datatest {
    let mut test = Datatest {
        errors: vec![],
        expected: vec![],
        source: String::new(),
        comments: vec![],
        error_lines: 0,
        expected_lines: 0,
    };
    let mut section = Section::Errors;

    for (idx, line) in contents.lines().enumerate() {
        if section != Section::Source && line.trim_start().starts_with(';') {
            test.comments.push((idx, line));
            match section {
                Section::Errors => test.error_lines += 1,
                Section::Expected => test.expected_lines += 1,
                Section::Source => {}
            }
            continue;
        }

        match section {
            Section::Errors if line.trim_end() == "---" => section = Section::Expected,
            Section::Errors => {
                test.error_lines += 1;
                test.errors.push(line);
            }
            Section::Expected if line.trim_end() == "---" => section = Section::Source,
            Section::Expected => {
                test.expected_lines += 1;
                test.expected.push(line);
            }
            Section::Source => {
                if !test.source.is_empty() {
                    test.source.push('\n');
                }
                test.source.push_str(line);
            }
        }
    }

    test
}

fn flush_comments<'a>(
    lines: &mut Vec<&'a str>,
    comments: &mut Vec<(usize, &'a str)>,
    shift: &impl Fn(usize) -> usize,
) {
    while comments
        .last()
        .is_some_and(|(line, _)| lines.len() >= shift(*line))
    {
        if let Some((_, comment)) = comments.pop() {
            lines.push(comment);
        }
    }
}

// Rebuilds a test file around fresh output, keeping each comment near the
// line it used to precede.
// from https://matklad.github.io/2021/05/31/how-to-test.html
fn stitch_to_datatest(test: Datatest, errors: &[String], expected: &[String]) -> String {
    let Datatest {
        source,
        comments,
        error_lines,
        expected_lines,
        ..
    } = test;
    // reversed so the next comment to place is at the end
    let mut comments: Vec<(usize, &str)> = comments.into_iter().rev().collect();

    // where a comment at `line` of the old file lands in the new one
    let error_delta = errors.len() as isize - error_lines as isize;
    let expected_delta = expected.len() as isize - expected_lines as isize;
    let shift = |line: usize| {
        if line < error_lines {
            line.saturating_add_signed(error_delta)
        } else {
            line.saturating_add_signed(error_delta + expected_delta)
        }
    };

    let mut lines = vec![];
    for line in errors {
        flush_comments(&mut lines, &mut comments, &shift);
        lines.push(line.as_str());
    }
    flush_comments(&mut lines, &mut comments, &shift);
    lines.push("---");
    for line in expected {
        flush_comments(&mut lines, &mut comments, &shift);
        lines.push(line.as_str());
    }
    lines.extend(comments.into_iter().rev().map(|(_, line)| line));
    lines.push("---");

    let mut stitched = lines.join("\n");
    stitched.push('\n');
    stitched.push_str(&source);
    stitched
}

fn finish(
    path: &Utf8Path,
    test: Datatest,
    errors: Vec<String>,
    expected: Vec<String>,
    failed: bool,
) -> datatest_stable::Result<()> {
    if std::env::var("DATATEST_EXPECT").is_ok() {
        std::fs::write(path, stitch_to_datatest(test, &errors, &expected))?;
        Ok(())
    } else if failed {
        Err(DatatestError(Box::from(path)))?
    } else {
        Ok(())
    }
}

fn errors_match(path: &Utf8Path, expected: &[&str], got: &[String]) -> bool {
    let expected: Vec<_> = expected.iter().map(|line| line.trim()).collect();
    if expected == got {
        return true;
    }
    println!("error in {path}: mismatched errors\n\nGot:\n{got:#?}\n\nExpected:\n{expected:#?}");
    false
}

fn lexer_test(path: &Utf8Path, contents: String) -> datatest_stable::Result<()> {
    let test = read_datatest(&contents);
    let mut errors = vec![];
    let mut tokens = vec![];
    for (token, span) in Token::lexer(&test.source).spanned() {
        match token {
            Ok(tok) if tok.is_trivia() => {}
            Ok(tok) => tokens.push(format!("[{span:?}] {tok:?}")),
            Err(err) => errors.push(format!("[{span:?}] {err}")),
        }
    }

    let mut failed = !errors_match(path, &test.errors, &errors);
    let expected: Vec<_> = test.expected.iter().map(|line| line.trim()).collect();
    if expected != tokens {
        println!("Lexer test {path} failed:\n  got -> expected");
        for idx in 0..expected.len().max(tokens.len()) {
            let got = tokens.get(idx).map_or("<not present>", String::as_str);
            let want = expected.get(idx).copied().unwrap_or("<not present>");
            if got != want {
                println!("  {got} -> {want}");
            }
        }
        failed = true;
    }

    finish(path, test, errors, tokens, failed)
}

fn parser_test(path: &Utf8Path, contents: String) -> datatest_stable::Result<()> {
    let test = read_datatest(&contents);
    let (errors, tree) = match parse_source(&test.source) {
        Ok(tree) => (vec![], Some(tree)),
        Err(err) => (vec![format!("[{:?}] {err}", err.span())], None),
    };

    let mut failed = !errors_match(path, &test.errors, &errors);
    let expected = test.expected.join("\n");
    let expected_tree = if expected.trim().is_empty() {
        None
    } else {
        match expected.parse::<ParseTree>() {
            Ok(tree) => Some(tree),
            Err(err) => {
                println!("error in {path}: bad expected tree: {err}");
                failed = true;
                None
            }
        }
    };
    if !failed && tree != expected_tree {
        println!(
            "error in {path}: mismatched tree\n\nGot:\n{}\n\nExpected:\n{}",
            tree.as_ref().map(|t| format!("{t:#}")).unwrap_or_default(),
            expected.trim()
        );
        failed = true;
    }

    let output = tree
        .map(|tree| format!("{tree:#}").lines().map(str::to_owned).collect())
        .unwrap_or_default();
    finish(path, test, errors, output, failed)
}

fn codegen_test(path: &Utf8Path, contents: String) -> datatest_stable::Result<()> {
    let test = read_datatest(&contents);
    let (errors, code) = match compile(&test.source, &CompileOptions::default()) {
        Ok(code) => (vec![], code),
        Err(err) => (vec![err.to_string()], vec![]),
    };

    let mut failed = !errors_match(path, &test.errors, &errors);
    match parse_listing(&test.expected.join("\n")) {
        Ok(expected) if expected == code => {}
        Ok(expected) => {
            println!("error in {path}: mismatched code\n  address: got -> expected");
            for idx in 0..expected.len().max(code.len()) {
                let got = code.get(idx).map_or("<not present>".to_owned(), |i| i.to_string());
                let want = expected
                    .get(idx)
                    .map_or("<not present>".to_owned(), |i| i.to_string());
                if got != want {
                    println!("  {idx}: {got} -> {want}");
                }
            }
            failed = true;
        }
        Err(err) => {
            println!("error in {path}: bad expected listing: {err}");
            failed = true;
        }
    }

    let listing = code.iter().map(ToString::to_string).collect();
    finish(path, test, errors, listing, failed)
}

datatest_stable::harness! {
    lexer_test, "test_data", r"^.*\.lxd",
    parser_test, "test_data", r"^.*\.ptd",
    codegen_test, "test_data", r"^.*\.cgd",
}
