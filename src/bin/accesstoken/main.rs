use getopts::Options;
use iop_token::access_token::{self, AUTH_CODE_INSTRUCTIONS, DEFAULT_SERVER_URL};
use iop_token::{IopClient, SignMethod};
use log::*;
use logosaurus::{self, Logger, L_LEVEL, L_TIME};
use std::env;
use std::io;
use std::process;

const APP_KEY_ENV: &str = "IOP_APP_KEY";
const APP_SECRET_ENV: &str = "IOP_APP_SECRET";

#[derive(Debug)]
struct Config {
    app_key: String,
    app_secret: String,
    server_url: String,
    sign_method: SignMethod,
    refresh: bool,
    verbose: bool,
    code: String,
}

#[tokio::main]
async fn main() {
    let args = env::args().collect::<Vec<String>>();
    let prog = args.get(0).map_or("accesstoken", |s| s.as_str());
    let opts = options();

    let cfg = match parse_config(&opts, args.get(1..).unwrap_or(&[]), |k| env::var(k).ok()) {
        Ok(Some(cfg)) => cfg,
        Ok(None) => {
            print_help(prog, &opts);
            process::exit(0);
        }
        Err(msg) => {
            eprint!("{}\n\n", msg);
            print_help(prog, &opts);
            process::exit(2);
        }
    };

    let level = if cfg.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let logger = Logger::builder(io::stderr())
        .set_prefix("accesstoken: ")
        .set_flags(L_LEVEL | L_TIME)
        .set_level(level)
        .build();
    logosaurus::init(logger).unwrap();

    let c = IopClient::new(&cfg.server_url, &cfg.app_key, &cfg.app_secret)
        .with_sign_method(cfg.sign_method);
    let result = if cfg.refresh {
        access_token::refresh_token(&c, &cfg.code).await
    } else {
        access_token::create_token(&c, &cfg.code).await
    };
    match &result {
        Ok(rsp) => access_token::log_token(rsp),
        Err(e) => error!("{:#}", e),
    }

    let stdout = io::stdout();
    if let Err(e) = access_token::print_outcome(result, &mut stdout.lock()) {
        error!("write stdout: {}", e);
        process::exit(1);
    }
}

fn options() -> Options {
    let mut opts = Options::new();
    opts.optopt("", "app-key", &format!("app key (default ${})", APP_KEY_ENV), "KEY");
    opts.optopt(
        "",
        "app-secret",
        &format!("app secret (default ${})", APP_SECRET_ENV),
        "SECRET",
    );
    opts.optopt(
        "",
        "url",
        &format!("gateway URL (default {})", DEFAULT_SERVER_URL),
        "URL",
    );
    opts.optopt("", "sign-method", "sha256 or md5 (default sha256)", "METHOD");
    opts.optflag("", "refresh", "treat the argument as a refresh token");
    opts.optflag("v", "verbose", "log the signed request");
    opts.optflag("h", "help", "print this help");
    opts
}

/// A flag value wins over the environment; empty values count as missing.
fn resolve(
    flag: Option<String>,
    env_value: Option<String>,
    name: &str,
    var: &str,
) -> Result<String, String> {
    let present = |v: &String| !v.is_empty();
    flag.filter(present)
        .or_else(|| env_value.filter(present))
        .ok_or_else(|| {
            format!(
                "missing {}: pass --{} or set {}",
                name.replace('-', " "),
                name,
                var
            )
        })
}

fn parse_sign_method(s: &str) -> Result<SignMethod, String> {
    match s {
        "sha256" => Ok(SignMethod::Sha256),
        "md5" => Ok(SignMethod::Md5),
        _ => Err(format!("unknown sign method: {}", s)),
    }
}

/// Returns `Ok(None)` when help was requested. `lookup` reads an
/// environment variable.
fn parse_config<F>(opts: &Options, args: &[String], lookup: F) -> Result<Option<Config>, String>
where
    F: Fn(&str) -> Option<String>,
{
    let m = opts.parse(args).map_err(|e| e.to_string())?;
    if m.opt_present("h") {
        return Ok(None);
    }
    if m.free.len() != 1 {
        return Err("expected exactly one authorization code".to_string());
    }

    let app_key = resolve(m.opt_str("app-key"), lookup(APP_KEY_ENV), "app-key", APP_KEY_ENV)?;
    let app_secret = resolve(
        m.opt_str("app-secret"),
        lookup(APP_SECRET_ENV),
        "app-secret",
        APP_SECRET_ENV,
    )?;
    let sign_method = match m.opt_str("sign-method") {
        Some(s) => parse_sign_method(&s)?,
        None => SignMethod::default(),
    };

    Ok(Some(Config {
        app_key,
        app_secret,
        server_url: m
            .opt_str("url")
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
        sign_method,
        refresh: m.opt_present("refresh"),
        verbose: m.opt_present("v"),
        code: m.free[0].clone(),
    }))
}

fn print_help(prog: &str, opts: &Options) {
    let brief = format!("usage: {} [options] <AUTHORIZATION_CODE>", prog);
    eprint!("{}\n", opts.usage(&brief));
    eprint!("To obtain AUTHORIZATION_CODE:\n");
    eprint!("{}\n", AUTH_CODE_INSTRUCTIONS);
}
