//! Reporter request construction from CLI flags.

use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, HOST, USER_AGENT};
use http::{HeaderMap, Method, Uri};
use regex::Regex;

use loadservo_control::RequestTemplate;

use crate::Cli;

/// Tool user agent, appended to whatever the operator configures.
pub const TOOL_UA: &str = concat!("loadservo/", env!("CARGO_PKG_VERSION"));

const HEADER_PATTERN: &str = r"^([\w-]+):\s*(.+)";
const AUTH_PATTERN: &str = r"^(.+):([^\s].+)";

/// Parse a repeatable `-H "Name: value"` flag.
pub fn parse_header(input: &str) -> anyhow::Result<(HeaderName, HeaderValue)> {
    let re = Regex::new(HEADER_PATTERN).expect("header pattern is valid");
    let caps = re
        .captures(input)
        .with_context(|| format!("could not parse header: {input}"))?;
    let name = HeaderName::from_bytes(caps[1].as_bytes())
        .with_context(|| format!("invalid header name in: {input}"))?;
    let value = HeaderValue::from_str(&caps[2])
        .with_context(|| format!("invalid header value in: {input}"))?;
    Ok((name, value))
}

/// Parse a `-a user:pass` flag into (username, password).
pub fn parse_auth(input: &str) -> anyhow::Result<(String, String)> {
    let re = Regex::new(AUTH_PATTERN).expect("auth pattern is valid");
    let caps = re
        .captures(input)
        .with_context(|| format!("could not parse basic auth: {input}"))?;
    Ok((caps[1].to_string(), caps[2].to_string()))
}

/// Split the load command line into command + argument vector.
pub fn split_command(line: &str) -> anyhow::Result<(String, Vec<String>)> {
    let mut parts = line.split_whitespace().map(str::to_string);
    let Some(command) = parts.next() else {
        bail!("load command is empty");
    };
    Ok((command, parts.collect()))
}

/// Assemble the request template the sampler reissues every tick.
pub fn build_template(cli: &Cli) -> anyhow::Result<RequestTemplate> {
    let method: Method = cli
        .method
        .to_uppercase()
        .parse()
        .with_context(|| format!("invalid HTTP method: {}", cli.method))?;
    let uri: Uri = cli
        .reporter_url
        .parse()
        .with_context(|| format!("invalid reporter URL: {}", cli.reporter_url))?;

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_str(&cli.content_type).context("invalid content type")?,
    );

    // Repeatable -H headers; later flags override earlier ones.
    for raw in &cli.headers {
        let (name, value) = parse_header(raw)?;
        headers.insert(name, value);
    }

    if let Some(accept) = &cli.accept {
        headers.insert(ACCEPT, HeaderValue::from_str(accept).context("invalid accept header")?);
    }

    if let Some(auth) = &cli.auth {
        let (user, pass) = parse_auth(auth)?;
        let encoded = BASE64.encode(format!("{user}:{pass}"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {encoded}")).context("invalid auth value")?,
        );
    }

    if let Some(host) = &cli.host {
        headers.insert(HOST, HeaderValue::from_str(host).context("invalid host header")?);
    }

    // The tool UA is always appended: a -U flag wins over a -H
    // user-agent, which wins over the bare tool UA.
    let ua = match (&cli.user_agent, headers.get(USER_AGENT)) {
        (Some(prefix), _) => format!("{prefix} {TOOL_UA}"),
        (None, Some(existing)) => {
            let existing = existing.to_str().context("invalid user-agent header")?;
            format!("{existing} {TOOL_UA}")
        }
        (None, None) => TOOL_UA.to_string(),
    };
    headers.insert(USER_AGENT, HeaderValue::from_str(&ua).context("invalid user agent")?);

    let body = match &cli.body_file {
        Some(path) => Bytes::from(
            std::fs::read(path)
                .with_context(|| format!("failed to read body file {}", path.display()))?,
        ),
        None => Bytes::from(cli.body.clone().into_bytes()),
    };

    Ok(RequestTemplate::new(method, uri, headers, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(extra: &[&str]) -> Cli {
        let mut argv = vec!["loadservo"];
        argv.extend_from_slice(extra);
        argv.extend_from_slice(&["http://localhost:6000/cpu", "hey -c % http://example.com"]);
        Cli::parse_from(argv)
    }

    #[test]
    fn header_flag_parses() {
        let (name, value) = parse_header("X-Trace-Id: abc123").unwrap();
        assert_eq!(name.as_str(), "x-trace-id");
        assert_eq!(value, "abc123");
    }

    #[test]
    fn malformed_header_rejected() {
        assert!(parse_header("not a header").is_err());
    }

    #[test]
    fn auth_flag_parses() {
        let (user, pass) = parse_auth("alice:s3cret").unwrap();
        assert_eq!(user, "alice");
        assert_eq!(pass, "s3cret");
    }

    #[test]
    fn command_line_splits_into_argv() {
        let (command, args) = split_command("hey -c 10 -q % http://example.com").unwrap();
        assert_eq!(command, "hey");
        assert_eq!(args, vec!["-c", "10", "-q", "%", "http://example.com"]);
    }

    #[test]
    fn empty_command_rejected() {
        assert!(split_command("   ").is_err());
    }

    #[test]
    fn default_template_has_content_type_and_tool_ua() {
        let template = build_template(&cli(&[])).unwrap();
        let req = template.clone_request();
        assert_eq!(req.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(req.headers()[USER_AGENT], TOOL_UA);
        assert_eq!(req.method(), Method::GET);
    }

    #[test]
    fn user_agent_flag_is_prefixed_to_tool_ua() {
        let template = build_template(&cli(&["-U", "loadgen"])).unwrap();
        let req = template.clone_request();
        let ua = req.headers()[USER_AGENT].to_str().unwrap().to_string();
        assert_eq!(ua, format!("loadgen {TOOL_UA}"));
    }

    #[test]
    fn basic_auth_header_is_encoded() {
        let template = build_template(&cli(&["-a", "alice:s3cret"])).unwrap();
        let req = template.clone_request();
        // base64("alice:s3cret")
        assert_eq!(req.headers()[AUTHORIZATION], "Basic YWxpY2U6czNjcmV0");
    }

    #[test]
    fn custom_headers_land_in_template() {
        let template = build_template(&cli(&["-H", "X-One: 1", "-H", "Accept-Language: en"])).unwrap();
        let req = template.clone_request();
        assert_eq!(req.headers()["x-one"], "1");
        assert_eq!(req.headers()["accept-language"], "en");
    }

    #[test]
    fn invalid_reporter_url_rejected() {
        let mut parsed = cli(&[]);
        parsed.reporter_url = "\\not a url".to_string();
        assert!(build_template(&parsed).is_err());
    }
}
