//! Snapshot of the invocation: cwd, environment, argv.

use prewarm_core::LaunchError;
use prewarm_ipc::{Environment, LaunchContext};
use std::ffi::OsString;
use std::io;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::PathBuf;

/// Which environment entries leave the launcher.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EnvPolicy {
    #[default]
    Full,
    AllowList(Vec<String>),
}

impl EnvPolicy {
    pub fn from_allow_list(allow: Option<&[String]>) -> Self {
        match allow {
            Some(names) => EnvPolicy::AllowList(names.to_vec()),
            None => EnvPolicy::Full,
        }
    }
}

/// Capture from the live process.
pub fn capture(policy: &EnvPolicy) -> Result<LaunchContext, LaunchError> {
    capture_from(
        std::env::current_dir(),
        std::env::vars_os(),
        std::env::args_os(),
        policy,
    )
}

/// Capture from explicit inputs. Only a failed cwd lookup is an error.
pub fn capture_from<V, A>(
    cwd: io::Result<PathBuf>,
    vars: V,
    args: A,
    policy: &EnvPolicy,
) -> Result<LaunchContext, LaunchError>
where
    V: IntoIterator<Item = (OsString, OsString)>,
    A: IntoIterator<Item = OsString>,
{
    let cwd = cwd.map_err(LaunchError::Context)?;
    let env = match policy {
        EnvPolicy::Full => Environment::Full(vars.into_iter().map(|(k, v)| entry(&k, &v)).collect()),
        EnvPolicy::AllowList(names) => Environment::Filtered(filtered(vars, names)),
    };
    Ok(LaunchContext {
        cwd: cwd.into_os_string().into_vec(),
        env,
        argv: args.into_iter().map(OsString::into_vec).collect(),
    })
}

fn entry(name: &OsString, value: &OsString) -> Vec<u8> {
    let mut e = Vec::with_capacity(name.len() + 1 + value.len());
    e.extend_from_slice(name.as_bytes());
    e.push(b'=');
    e.extend_from_slice(value.as_bytes());
    e
}

/// Allow-listed entries in allow-list order, joined with `\n`. Values that
/// contain a newline cannot be represented and are left out.
fn filtered<V>(vars: V, names: &[String]) -> Vec<u8>
where
    V: IntoIterator<Item = (OsString, OsString)>,
{
    let vars: Vec<(OsString, OsString)> = vars.into_iter().collect();
    let mut blob = Vec::new();
    for name in names {
        let Some((k, v)) = vars.iter().find(|(k, _)| k.as_bytes() == name.as_bytes()) else {
            continue;
        };
        if v.as_bytes().contains(&b'\n') {
            tracing::debug!(name = %name, "skipping variable with embedded newline");
            continue;
        }
        if !blob.is_empty() {
            blob.push(b'\n');
        }
        blob.extend_from_slice(&entry(k, v));
    }
    blob
}

#[cfg(test)]
mod tests {
    use super::*;
    use prewarm_ipc::EnvMode;
    use std::io::Cursor;

    fn os(pairs: &[(&str, &str)]) -> Vec<(OsString, OsString)> {
        pairs
            .iter()
            .map(|(k, v)| (OsString::from(k), OsString::from(v)))
            .collect()
    }

    fn args(a: &[&str]) -> Vec<OsString> {
        a.iter().map(OsString::from).collect()
    }

    #[test]
    fn request_decodes_back_to_the_invocation() {
        let ctx = capture_from(
            Ok(PathBuf::from("/home/u/proj")),
            os(&[("PYTHONPATH", "/x"), ("TERM", "xterm")]),
            args(&["prog", "--flag", "value"]),
            &EnvPolicy::Full,
        )
        .unwrap();

        let bytes = ctx.to_bytes().unwrap();
        let back = LaunchContext::decode(&mut Cursor::new(bytes), EnvMode::Full).unwrap();
        assert_eq!(back.cwd, b"/home/u/proj");
        assert_eq!(back.argv.len(), 3);
        assert_eq!(
            back.argv,
            vec![b"prog".to_vec(), b"--flag".to_vec(), b"value".to_vec()]
        );
        assert!(back.env.contains(b"PYTHONPATH=/x"));
    }

    #[test]
    fn allow_list_keeps_only_named_variables() {
        let ctx = capture_from(
            Ok(PathBuf::from("/w")),
            os(&[("SECRET", "s"), ("PYTHONPATH", "/x"), ("HOME", "/h")]),
            args(&["prog"]),
            &EnvPolicy::AllowList(vec!["HOME".into(), "PYTHONPATH".into(), "MISSING".into()]),
        )
        .unwrap();
        assert_eq!(ctx.env, Environment::Filtered(b"HOME=/h\nPYTHONPATH=/x".to_vec()));
    }

    #[test]
    fn newline_values_are_dropped_from_the_blob() {
        let ctx = capture_from(
            Ok(PathBuf::from("/w")),
            os(&[("A", "1\n2"), ("B", "ok")]),
            args(&["prog"]),
            &EnvPolicy::AllowList(vec!["A".into(), "B".into()]),
        )
        .unwrap();
        assert_eq!(ctx.env, Environment::Filtered(b"B=ok".to_vec()));
    }

    #[test]
    fn missing_cwd_is_a_context_error() {
        let err = capture_from(
            Err(io::Error::from(io::ErrorKind::NotFound)),
            os(&[]),
            args(&["prog"]),
            &EnvPolicy::Full,
        )
        .unwrap_err();
        assert!(matches!(err, LaunchError::Context(_)));
    }

    #[test]
    fn non_utf8_arguments_pass_through() {
        let ctx = capture_from(
            Ok(PathBuf::from("/w")),
            os(&[]),
            vec![OsString::from("prog"), OsString::from_vec(vec![0xff, 0x00, 0x41])],
            &EnvPolicy::Full,
        )
        .unwrap();
        assert_eq!(ctx.argv[1], vec![0xff, 0x00, 0x41]);
    }
}
