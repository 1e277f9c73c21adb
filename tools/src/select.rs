use crate::pager;
use colored::Colorize;
use pmexplain_common::classify::Candidate;
use pmexplain_common::errors::*;
use std::fmt::Write as _;
use std::io::{self, BufRead, Write};

pub fn listing(candidates: &[Candidate]) -> Result<String> {
    let width = candidates.len().to_string().len();
    let mut out = String::new();
    for (i, c) in candidates.iter().enumerate() {
        let age = format!("{:>4} days", c.age.floor() as i64);
        let mut line = format!(
            "{:>width$}) {} {} {}",
            i + 1,
            age.bright_black(),
            c.name.bold(),
            c.version,
            width = width
        );
        if c.is_candidate {
            write!(line, " {}", "(candidate)".green())?;
        }
        writeln!(out, "{}", line)?;
    }
    Ok(out)
}

/// Accepts either the number shown in the listing or a package name
pub fn parse_choice(input: &str, candidates: &[Candidate]) -> Result<Option<String>> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }

    if let Ok(idx) = input.parse::<usize>() {
        let c = idx
            .checked_sub(1)
            .and_then(|i| candidates.get(i))
            .with_context(|| anyhow!("No package with number {} in the list", idx))?;
        return Ok(Some(c.name.clone()));
    }

    if candidates.iter().any(|c| c.name == input) {
        Ok(Some(input.to_string()))
    } else {
        bail!("No excuse for {:?}", input)
    }
}

/// Shows the candidates and asks which one should be explained
pub fn prompt(candidates: &[Candidate]) -> Result<Option<String>> {
    if candidates.is_empty() {
        info!("Nothing is waiting in -proposed");
        return Ok(None);
    }

    pager::write(listing(candidates)?.as_bytes())?;

    let stdin = io::stdin();
    let mut stderr = io::stderr();
    loop {
        write!(stderr, "Package to explain (number or name, empty to quit): ")?;
        stderr.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        match parse_choice(&line, candidates) {
            Ok(choice) => return Ok(choice),
            Err(err) => error!("{:#}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<Candidate> {
        vec![
            Candidate {
                name: "glibc".to_string(),
                version: "2.39-0ubuntu2".to_string(),
                age: 12.6,
                is_candidate: false,
            },
            Candidate {
                name: "hello".to_string(),
                version: "2.10-3".to_string(),
                age: 0.2,
                is_candidate: true,
            },
        ]
    }

    #[test]
    fn choose_by_number() {
        let c = candidates();
        assert_eq!(parse_choice("1\n", &c).unwrap().as_deref(), Some("glibc"));
        assert_eq!(parse_choice(" 2 ", &c).unwrap().as_deref(), Some("hello"));
        assert!(parse_choice("0", &c).is_err());
        assert!(parse_choice("3", &c).is_err());
    }

    #[test]
    fn choose_by_name() {
        let c = candidates();
        assert_eq!(parse_choice("hello\n", &c).unwrap().as_deref(), Some("hello"));
        assert!(parse_choice("bash", &c).is_err());
    }

    #[test]
    fn choose_nothing() {
        assert_eq!(parse_choice("\n", &candidates()).unwrap(), None);
    }

    #[test]
    fn list_candidates() {
        colored::control::set_override(false);
        let out = listing(&candidates()).unwrap();
        assert_eq!(
            out,
            "1)   12 days glibc 2.39-0ubuntu2
2)    0 days hello 2.10-3 (candidate)
"
        );
    }
}
