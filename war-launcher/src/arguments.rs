use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const WARFILE_FLAG: &str = "--warfile=";
pub const WEBROOT_FLAG: &str = "--webroot=";
const WEBROOT_PREFIX: &str = ".webroot-";

/// Splits a manifest parameter string on runs of ASCII whitespace
/// (space, tab, line feed, vertical tab, form feed, carriage return).
/// Other characters, non-breaking spaces included, stay inside tokens.
pub fn split_parameters(raw: &str) -> Vec<String> {
    trim_control(raw)
        .split(|c: char| matches!(c, ' ' | '\t' | '\n' | '\x0B' | '\x0C' | '\r'))
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Strips leading and trailing spaces and ASCII control characters.
pub fn trim_control(raw: &str) -> &str {
    raw.trim_matches(|c: char| c <= ' ')
}

/// `<home>/.webroot-<archive file name>`. The directory is left for the runtime to create.
pub fn web_root(home: &Path, archive: &Path) -> PathBuf {
    let mut name = OsString::from(WEBROOT_PREFIX);
    name.push(archive.file_name().unwrap_or_default());
    home.join(name)
}

/// Builds the runtime's argument vector:
/// `--warfile=<archive>`, the caller's arguments, `--webroot=<web root>`,
/// then the extra parameters. Runtime parsers are order sensitive, so the
/// order is fixed.
pub fn compose<I>(caller: I, archive: &Path, web_root: &Path, extra: &[String]) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args = vec![flag(WARFILE_FLAG, archive)];
    args.extend(caller);
    args.push(flag(WEBROOT_FLAG, web_root));
    args.extend(extra.iter().map(OsString::from));
    args
}

fn flag(name: &str, value: &Path) -> OsString {
    let mut flag = OsString::from(name);
    flag.push(value);
    flag
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(values: &[&str]) -> Vec<OsString> {
        values.iter().map(OsString::from).collect()
    }

    #[test]
    fn splits_on_whitespace_runs() {
        assert_eq!(split_parameters("  a   b\tc "), ["a", "b", "c"]);
        assert_eq!(split_parameters("--useJNDI=false\n--ajp13Port=-1"), ["--useJNDI=false", "--ajp13Port=-1"]);
        assert!(split_parameters("").is_empty());
        assert!(split_parameters(" \t ").is_empty());
        assert_eq!(split_parameters("a\x0Bb\x0Cc"), ["a", "b", "c"]);
    }

    #[test]
    fn non_breaking_space_is_not_a_separator() {
        assert_eq!(split_parameters("--name=a\u{a0}b --x"), ["--name=a\u{a0}b", "--x"]);
        assert_eq!(split_parameters("\u{2003}--x"), ["\u{2003}--x"]);
    }

    #[test]
    fn trims_ascii_controls_only() {
        assert_eq!(trim_control("\x01 winstone.jar\x7f"), "winstone.jar\x7f");
        assert_eq!(trim_control("\u{a0}winstone.jar "), "\u{a0}winstone.jar");
    }

    #[cfg(unix)]
    #[test]
    fn composes_documented_scenario() {
        let archive = Path::new("/opt/app.war");
        let root = web_root(Path::new("/home/u"), archive);
        assert_eq!(root, Path::new("/home/u/.webroot-app.war"));

        let args = compose(os(&["--port=9090"]), archive, &root, &[]);
        assert_eq!(
            args,
            os(&["--warfile=/opt/app.war", "--port=9090", "--webroot=/home/u/.webroot-app.war"])
        );
    }

    #[cfg(unix)]
    #[test]
    fn keeps_caller_order_and_appends_extra_parameters_last() {
        let archive = Path::new("/srv/shop.war");
        let root = web_root(Path::new("/root"), archive);
        let extra = split_parameters(" --useJNDI=false  --httpPort=1 ");
        let args = compose(os(&["--httpPort=2", "b", "a", "--httpPort=3"]), archive, &root, &extra);

        assert_eq!(
            args,
            os(&[
                "--warfile=/srv/shop.war",
                "--httpPort=2",
                "b",
                "a",
                "--httpPort=3",
                "--webroot=/root/.webroot-shop.war",
                "--useJNDI=false",
                "--httpPort=1",
            ])
        );
    }

    #[test]
    fn no_caller_arguments() {
        let archive = Path::new("app.war");
        let root = PathBuf::from("root");
        let args = compose(Vec::new(), archive, &root, &[]);
        assert_eq!(args, os(&["--warfile=app.war", "--webroot=root"]));
    }
}
