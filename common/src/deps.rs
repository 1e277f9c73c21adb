use crate::errors::*;
use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::multispace0;
use nom::combinator::opt;
use nom::sequence::preceded;
use nom::{IResult, Parser};

fn is_pkg_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.'
}

/// `name[:qualifier]`, the qualifier (`:any`, `:native`, ...) is dropped
fn package_name(input: &str) -> IResult<&str, &str> {
    let (input, name) = preceded(multispace0, take_while1(is_pkg_char)).parse(input)?;
    let (input, _) = opt(preceded(tag(":"), take_while(is_pkg_char))).parse(input)?;
    Ok((input, name))
}

/// Package names of every alternative in a dependency signature like
/// `libfoo1 (>= 2) | libfoo2:any`
pub fn alternatives(signature: &str) -> Vec<&str> {
    signature
        .split('|')
        .filter_map(|alt| package_name(alt).ok().map(|(_, name)| name))
        .collect()
}

/// The package the migration tool would try first
pub fn depended_on(signature: &str) -> Result<&str> {
    alternatives(signature)
        .into_iter()
        .next()
        .with_context(|| anyhow!("Failed to parse dependency: {:?}", signature))
}

/// Turn `arch -> [signature]` around into `signature -> [arch]`, keeping the
/// order signatures are first seen in the report
pub fn group_by_signature(unsatisfiable: &[(String, Vec<String>)]) -> Vec<(String, Vec<String>)> {
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    for (arch, signatures) in unsatisfiable {
        for signature in signatures {
            if let Some((_, archs)) = grouped.iter_mut().find(|(s, _)| s == signature) {
                if !archs.contains(arch) {
                    archs.push(arch.clone());
                }
            } else {
                grouped.push((signature.clone(), vec![arch.clone()]));
            }
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_name() {
        assert_eq!(depended_on("libfoo1").unwrap(), "libfoo1");
    }

    #[test]
    fn test_version_constraint() {
        assert_eq!(depended_on("libfoo1 (>= 2.0-1)").unwrap(), "libfoo1");
    }

    #[test]
    fn test_arch_qualifier() {
        assert_eq!(depended_on("python3:any (>= 3.12~)").unwrap(), "python3");
    }

    #[test]
    fn test_alternatives() {
        assert_eq!(
            alternatives("default-mta | mail-transport-agent"),
            vec!["default-mta", "mail-transport-agent"]
        );
        assert_eq!(depended_on("libstdc++6 (>= 13) | foo").unwrap(), "libstdc++6");
    }

    #[test]
    fn test_garbage() {
        assert!(depended_on("(>= 2)").is_err());
        assert!(depended_on("").is_err());
    }

    #[test]
    fn test_group_by_signature() {
        let unsat = vec![
            (
                "amd64".to_string(),
                vec!["libfoo1 (>= 2)".to_string(), "libbar".to_string()],
            ),
            ("arm64".to_string(), vec!["libfoo1 (>= 2)".to_string()]),
            ("armhf".to_string(), vec!["libfoo1 (>= 2)".to_string()]),
        ];

        let grouped = group_by_signature(&unsat);
        assert_eq!(
            grouped,
            vec![
                (
                    "libfoo1 (>= 2)".to_string(),
                    vec!["amd64".to_string(), "arm64".to_string(), "armhf".to_string()]
                ),
                ("libbar".to_string(), vec!["amd64".to_string()]),
            ]
        );
    }

    #[test]
    fn test_group_by_signature_report_order() {
        let unsat = vec![
            ("s390x".to_string(), vec!["libz".to_string()]),
            ("amd64".to_string(), vec!["liba".to_string(), "libz".to_string()]),
        ];
        let grouped = group_by_signature(&unsat);
        assert_eq!(grouped[0], ("libz".to_string(), vec!["s390x".to_string(), "amd64".to_string()]));
        assert_eq!(grouped[1], ("liba".to_string(), vec!["amd64".to_string()]));
    }
}
