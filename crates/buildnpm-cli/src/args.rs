use anyhow::{anyhow, Context, Result};
use buildnpm_installer::BuildConfiguration;
use buildnpm_registry::DEFAULT_THREADS;

/// Options addressed to buildnpm that arrive mixed into the npm arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub threads: i32,
    pub build: BuildConfiguration,
    pub npm_args: Vec<String>,
}

const THREADS_FLAG: &str = "--threads";
const BUILD_NAME_FLAG: &str = "--build-name";
const BUILD_NUMBER_FLAG: &str = "--build-number";
const MODULE_FLAG: &str = "--module";

/// Pulls `--threads`, `--build-name`, `--build-number` and `--module` out of
/// `args` (as `--flag=value` or `--flag value`); everything else is left for
/// npm in its original order.
pub fn extract_build_options(args: &[String]) -> Result<BuildOptions> {
    let mut threads = None;
    let mut build = BuildConfiguration::default();
    let mut npm_args = Vec::with_capacity(args.len());

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let (flag, inline_value) = match arg.split_once('=') {
            Some((flag, value)) => (flag, Some(value.to_string())),
            None => (arg.as_str(), None),
        };
        if ![THREADS_FLAG, BUILD_NAME_FLAG, BUILD_NUMBER_FLAG, MODULE_FLAG].contains(&flag) {
            npm_args.push(arg.clone());
            continue;
        }

        let value = match inline_value {
            Some(value) => value,
            None => iter
                .next()
                .cloned()
                .ok_or_else(|| anyhow!("{flag} requires a value"))?,
        };
        match flag {
            THREADS_FLAG => {
                let parsed = value
                    .trim()
                    .parse::<i32>()
                    .with_context(|| format!("invalid {THREADS_FLAG} value '{value}'"))?;
                threads = Some(parsed);
            }
            BUILD_NAME_FLAG => build.name = Some(value),
            BUILD_NUMBER_FLAG => build.number = Some(value),
            _ => build.module = Some(value),
        }
    }

    if build.name.is_some() != build.number.is_some() {
        return Err(anyhow!(
            "{BUILD_NAME_FLAG} and {BUILD_NUMBER_FLAG} must be provided together"
        ));
    }
    if build.module.is_some() && build.name.is_none() {
        return Err(anyhow!(
            "{MODULE_FLAG} requires {BUILD_NAME_FLAG} and {BUILD_NUMBER_FLAG}"
        ));
    }

    Ok(BuildOptions {
        threads: threads.unwrap_or(DEFAULT_THREADS),
        build,
        npm_args,
    })
}
