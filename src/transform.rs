//! Gateway to the external genome-to-transcript coordinate tool.
//!
//! The tool reads a headerless two-column TSV of (transcript_id,
//! genomic_position) and prints four columns per row: transcript_id,
//! genomic_position, transcript_position, feature type. Each invocation is
//! all-or-nothing: any launch, exit or parse problem fails the whole call.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, info};
use serde::{Serialize, Deserialize};

use crate::error::TransformError;

/// One row of transform tool output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformedRecord {
    pub transcript_id: String,
    pub genomic_position: u32,
    pub transcript_position: i64,
    pub feature_type: String,
}

/// How to run the tool: `<program> <args...> -g <annotation> -i <input>`.
#[derive(Debug, Clone)]
pub struct TransformTool {
    pub program: String,
    pub args: Vec<String>,
    pub annotation: PathBuf,
}

impl TransformTool {
    /// `gppy g2t` against `annotation`.
    pub fn gppy(annotation: impl Into<PathBuf>) -> Self {
        Self::new("gppy", annotation).with_args(&["g2t"])
    }

    pub fn new(program: impl Into<String>, annotation: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            annotation: annotation.into(),
        }
    }

    /// Leading arguments placed before `-g`/`-i` (e.g. a subcommand).
    pub fn with_args<S: AsRef<str>>(mut self, args: &[S]) -> Self {
        self.args = args.iter().map(|a| a.as_ref().to_string()).collect();
        self
    }

    fn command(&self, input: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("-g")
            .arg(&self.annotation)
            .arg("-i")
            .arg(input)
            .stdin(Stdio::null());
        cmd
    }

    /// Write `pairs` to `input`, run the tool, save its stdout verbatim to
    /// `output` and parse it.
    pub fn transform<'a, I>(
        &self,
        pairs: I,
        input: &Path,
        output: &Path,
    ) -> Result<Vec<TransformedRecord>, TransformError>
    where
        I: IntoIterator<Item = (&'a str, u32)>,
    {
        let n = write_pairs(input, pairs)?;
        info!(
            "Running {} {} on {} positions",
            self.program,
            self.args.join(" "),
            n
        );

        let stdout = self.run(input)?;

        std::fs::write(output, &stdout).map_err(|source| TransformError::WriteOutput {
            path: output.to_path_buf(),
            source,
        })?;

        let records = parse_output(&stdout)?;
        debug!("{} returned {} rows", self.program, records.len());
        Ok(records)
    }

    /// Run the tool on an existing input file and return its stdout.
    pub fn run(&self, input: &Path) -> Result<Vec<u8>, TransformError> {
        let out = self
            .command(input)
            .output()
            .map_err(|source| TransformError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !out.status.success() {
            return Err(TransformError::ExitStatus {
                program: self.program.clone(),
                status: out.status.to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }

        Ok(out.stdout)
    }
}

/// Write (transcript_id, genomic_position) rows as a headerless TSV.
/// Returns the number of rows written.
pub fn write_pairs<'a, I>(path: &Path, pairs: I) -> Result<usize, TransformError>
where
    I: IntoIterator<Item = (&'a str, u32)>,
{
    let write_err = |source: std::io::Error| TransformError::WriteInput {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(write_err)?;
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(BufWriter::new(file));

    let mut n = 0;
    for (transcript_id, position) in pairs {
        wtr.write_record([transcript_id, position.to_string().as_str()])
            .map_err(|e| write_err(e.into()))?;
        n += 1;
    }
    wtr.flush().map_err(write_err)?;
    Ok(n)
}

/// Parse four-column tool output. Blank lines are ignored; anything else
/// that does not fit the layout is an error.
pub fn parse_output(bytes: &[u8]) -> Result<Vec<TransformedRecord>, TransformError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(bytes);

    let mut out = Vec::new();
    for (i, row) in rdr.records().enumerate() {
        let malformed = |line_no: usize, problem: String, line: String| TransformError::MalformedRow {
            line_no,
            problem,
            line,
        };

        let row = row.map_err(|e| malformed(i + 1, e.to_string(), String::new()))?;
        let line_no = row.position().map(|p| p.line() as usize).unwrap_or(i + 1);
        let line = row.iter().collect::<Vec<_>>().join("\t");

        if row.len() != 4 {
            return Err(malformed(line_no, format!("expected 4 columns, found {}", row.len()), line));
        }

        let genomic_position = row[1]
            .trim()
            .parse::<u32>()
            .map_err(|e| malformed(line_no, format!("genomic position: {e}"), line.clone()))?;
        let transcript_position = row[2]
            .trim()
            .parse::<i64>()
            .map_err(|e| malformed(line_no, format!("transcript position: {e}"), line.clone()))?;

        out.push(TransformedRecord {
            transcript_id: row[0].to_string(),
            genomic_position,
            transcript_position,
            feature_type: row[3].to_string(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_are_written_headerless_and_tab_separated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gppy_input.tsv");
        let n = write_pairs(&path, vec![("T1", 1000), ("T1", 1000), ("ENST0001.2", 5)]).unwrap();
        assert_eq!(n, 3);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "T1\t1000\nT1\t1000\nENST0001.2\t5\n"
        );
    }

    #[test]
    fn parses_four_column_output() {
        let out = b"T1\t1000\t50\texon\n\nT2\t20\t-3\tintron\n";
        let recs = parse_output(out).unwrap();
        assert_eq!(
            recs,
            vec![
                TransformedRecord {
                    transcript_id: "T1".into(),
                    genomic_position: 1000,
                    transcript_position: 50,
                    feature_type: "exon".into(),
                },
                TransformedRecord {
                    transcript_id: "T2".into(),
                    genomic_position: 20,
                    transcript_position: -3,
                    feature_type: "intron".into(),
                },
            ]
        );
        assert!(parse_output(b"").unwrap().is_empty());
    }

    #[test]
    fn malformed_output_is_fatal() {
        let err = parse_output(b"T1\t1000\t50\texon\nT1\t1000\t50\n").unwrap_err();
        match err {
            TransformError::MalformedRow { line_no, problem, .. } => {
                assert_eq!(line_no, 2);
                assert!(problem.contains("expected 4 columns"));
            }
            other => panic!("unexpected error {other}"),
        }

        let err = parse_output(b"T1\tabc\t50\texon\n").unwrap_err();
        assert!(err.to_string().contains("genomic position"));
        let err = parse_output(b"T1\t1000\tNA\texon\n").unwrap_err();
        assert!(err.to_string().contains("transcript position"));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = TransformTool::new("definitely-not-a-real-g2t-binary", "genes.gtf");
        let err = tool
            .transform(vec![("T1", 1)], &dir.path().join("in.tsv"), &dir.path().join("out.tsv"))
            .unwrap_err();
        assert!(matches!(err, TransformError::Spawn { .. }));
    }

    #[cfg(unix)]
    fn script_tool(dir: &Path, body: &str) -> TransformTool {
        let script = dir.join("fake_g2t.sh");
        std::fs::write(&script, body).unwrap();
        TransformTool::new("sh", dir.join("genes.gtf")).with_args(&[script.to_str().unwrap()])
    }

    #[cfg(unix)]
    #[test]
    fn runs_tool_and_keeps_its_output() {
        let dir = tempfile::tempdir().unwrap();
        // sh script -g <gtf> -i <input>
        let tool = script_tool(
            dir.path(),
            "awk -F'\\t' 'BEGIN { OFS = \"\\t\" } { print $1, $2, $2 - 950, \"exon\" }' \"$4\"\n",
        );
        let input = dir.path().join("gppy_input.tsv");
        let output = dir.path().join("gppy_output.tsv");

        let recs = tool.transform(vec![("T1", 1000), ("T2", 960)], &input, &output).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].transcript_position, 50);
        assert_eq!(recs[1].transcript_id, "T2");
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "T1\t1000\t50\texon\nT2\t960\t10\texon\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let tool = script_tool(dir.path(), "echo 'no such gtf' >&2\nexit 3\n");
        let err = tool
            .transform(vec![("T1", 1)], &dir.path().join("in.tsv"), &dir.path().join("out.tsv"))
            .unwrap_err();
        match err {
            TransformError::ExitStatus { status, stderr, .. } => {
                assert!(status.contains('3'));
                assert_eq!(stderr, "no such gtf");
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(!dir.path().join("out.tsv").exists());
    }
}
