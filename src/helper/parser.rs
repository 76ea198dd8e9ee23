//! Line-oriented parsers for the dataflow and layer file formats.
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::{ModelError, Result};
use crate::ir::{Directive, DirectiveTable, Loop, LoopTable};

const DELIMITERS: &[char] = &[' ', ',', '-', '>', '(', ')'];

fn tokenize(line: &str) -> Vec<&str> {
    line.split(|c| DELIMITERS.contains(&c))
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_int(file: &Path, line_no: usize, raw: &str) -> Result<i64> {
    raw.parse::<i64>().map_err(|_| ModelError::ParseError {
        file: file.to_path_buf(),
        line: line_no,
        reason: format!("expected an integer, found `{}`", raw),
    })
}

/// Parses a dataflow file into an ordered `DirectiveTable`.
///
/// A line whose head token doesn't match one of the five known keywords is
/// a parse error rather than being silently dropped, unlike parsers that
/// skip unrecognized lines without comment.
pub fn parse_dataflow(path: impl AsRef<Path>, contents: &str) -> Result<DirectiveTable> {
    let file = path.as_ref().to_path_buf();
    let mut table = DirectiveTable::new();
    for (line_no, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let tokens = tokenize(line);
        let directive = parse_directive_line(&file, line_no + 1, &tokens)?;
        table.push(directive);
    }
    Ok(table)
}

fn parse_directive_line(file: &PathBuf, line_no: usize, tokens: &[&str]) -> Result<Directive> {
    let head = tokens.first().copied().ok_or_else(|| ModelError::ParseError {
        file: file.clone(),
        line: line_no,
        reason: "empty directive line".to_string(),
    })?;
    let unknown = || ModelError::ParseError {
        file: file.clone(),
        line: line_no,
        reason: format!("unrecognized directive keyword `{}`", head),
    };
    match head {
        "Temporal_Map" => {
            let [size, offset, var] = take3(tokens, file, line_no)?;
            Ok(Directive::TemporalMap {
                var: var.to_string(),
                size: parse_int(file, line_no, size)?,
                offset: parse_int(file, line_no, offset)?,
            })
        }
        "Spatial_Map" => {
            let [size, offset, var] = take3(tokens, file, line_no)?;
            Ok(Directive::SpatialMap {
                var: var.to_string(),
                size: parse_int(file, line_no, size)?,
                offset: parse_int(file, line_no, offset)?,
                num_components: 1,
            })
        }
        "Cluster" => {
            let [tile_size, var] = take2(tokens, file, line_no)?;
            Ok(Directive::Tile {
                var: var.to_string(),
                tile_size: parse_int(file, line_no, tile_size)?,
            })
        }
        "unroll" => {
            let [var] = take1(tokens, file, line_no)?;
            Ok(Directive::Unroll { var: var.to_string() })
        }
        "merge" => {
            let [var] = take1(tokens, file, line_no)?;
            Ok(Directive::Merge { var: var.to_string() })
        }
        _ => Err(unknown()),
    }
}

fn take1<'a>(tokens: &[&'a str], file: &Path, line_no: usize) -> Result<[&'a str; 1]> {
    match tokens {
        [_, var] => Ok([var]),
        _ => Err(ModelError::ParseError {
            file: file.to_path_buf(),
            line: line_no,
            reason: "expected one variable name after the directive keyword".to_string(),
        }),
    }
}

fn take2<'a>(tokens: &[&'a str], file: &Path, line_no: usize) -> Result<[&'a str; 2]> {
    match tokens {
        [_, a, b] => Ok([a, b]),
        _ => Err(ModelError::ParseError {
            file: file.to_path_buf(),
            line: line_no,
            reason: "expected size and variable name after the directive keyword".to_string(),
        }),
    }
}

fn take3<'a>(tokens: &[&'a str], file: &Path, line_no: usize) -> Result<[&'a str; 3]> {
    match tokens {
        [_, a, b, c] => Ok([a, b, c]),
        _ => Err(ModelError::ParseError {
            file: file.to_path_buf(),
            line: line_no,
            reason: "expected size, offset and variable name after the directive keyword"
                .to_string(),
        }),
    }
}

/// Parses a layer file into a `LoopTable`. Extra tokens on a line are
/// logged and ignored rather than rejected.
pub fn parse_layer(path: impl AsRef<Path>, contents: &str) -> Result<LoopTable> {
    let file = path.as_ref().to_path_buf();
    let mut table = LoopTable::new();
    for (line_no, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let tokens = tokenize(line);
        if tokens.len() < 2 {
            return Err(ModelError::ParseError {
                file,
                line: line_no + 1,
                reason: "expected a loop variable and a bound".to_string(),
            });
        }
        let var = tokens[0];
        let bound = parse_int(&file, line_no + 1, tokens[1])?;
        if tokens.len() > 2 {
            warn!(
                "{}:{}: ignoring extra tokens after `{} {}`",
                file.display(),
                line_no + 1,
                var,
                bound
            );
        }
        table.push(Loop::new(var, bound));
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_directive_kind() {
        let src = "Temporal_Map(1,1) K\nSpatial_Map(16,16) C\nCluster(4) K\nunroll R\nmerge S\n";
        let table = parse_dataflow("dataflow.m", src).unwrap();
        assert_eq!(table.len(), 5);
        assert!(table.get(0).unwrap().is_temporal_map());
        assert!(table.get(1).unwrap().is_spatial_map());
        assert!(table.get(2).unwrap().is_tile());
        assert!(table.get(3).unwrap().is_unroll());
        assert!(table.get(4).unwrap().is_merge());
    }

    #[test]
    fn unknown_keyword_is_a_parse_error() {
        let err = parse_dataflow("dataflow.m", "Banana(1,1) K\n").unwrap_err();
        assert!(matches!(err, ModelError::ParseError { .. }));
    }

    #[test]
    fn layer_file_tolerates_extra_tokens() {
        let table = parse_layer("layer.m", "K 16 extra tokens here\nC 8\n").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.find_loop("K").unwrap().bound, 16);
    }
}
