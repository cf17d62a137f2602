#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use prewarm_ipc::{EnvMode, Environment, LaunchContext};
use std::io::Cursor;

/// Structured request so the decoder sees well-formed frames, not just noise.
#[derive(Arbitrary, Debug)]
struct ContextArb {
    cwd: Vec<u8>,
    env: Vec<Vec<u8>>,
    #[arbitrary(with = gen_bool)]
    filtered: bool,
    argv: Vec<Vec<u8>>,
    // chop this many bytes off the tail to hit short-read paths
    cut: u8,
}

fn gen_bool(u: &mut arbitrary::Unstructured<'_>) -> arbitrary::Result<bool> {
    Ok(u.int_in_range(0..=1)? == 1)
}

fuzz_target!(|input: ContextArb| {
    let (env, mode) = if input.filtered {
        (Environment::Filtered(input.env.join(&b'\n')), EnvMode::Filtered)
    } else {
        (Environment::Full(input.env), EnvMode::Full)
    };
    let ctx = LaunchContext {
        cwd: input.cwd,
        env,
        argv: input.argv,
    };
    let bytes = ctx.to_bytes().unwrap();

    let back = LaunchContext::decode(&mut Cursor::new(&bytes), mode).unwrap();
    assert_eq!(back, ctx);

    let cut = (input.cut as usize).min(bytes.len());
    if cut > 0 {
        let short = &bytes[..bytes.len() - cut];
        assert!(LaunchContext::decode(&mut Cursor::new(short), mode).is_err());
    }
});
