//! Network speech synthesis used by the exporter.
//!
//! A [`Synthesizer`] turns one chunk of text into MP3 bytes.  Every request
//! carries both the plain text and its SSML markup; each backend sends the
//! representation its service understands.

use std::{collections::BTreeMap, time::Duration};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use ureq::Agent;

use crate::config::SynthSettings;

/// One chunk to synthesize.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub text: &'a str,
    pub markup: &'a str,
    /// Two-letter language code.
    pub language: &'a str,
}

pub trait Synthesizer {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    /// Audio bytes for one chunk.  An empty response is an error.
    fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Vec<u8>>;
}

/// Which synthesis service to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Google Translate's `translate_tts` endpoint; plain text.
    #[default]
    Translate,
    /// An HTTP endpoint accepting SSML; markup.
    Ssml,
}

fn agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

fn read_audio(mut response: ureq::http::Response<ureq::Body>, service: &str) -> Result<Vec<u8>> {
    let bytes = response
        .body_mut()
        .read_to_vec()
        .with_context(|| format!("Cannot read audio from {}", service))?;
    if bytes.is_empty() {
        bail!("{} returned no audio", service);
    }
    Ok(bytes)
}

// ─────────────────────────────────────────────────────────────────────────────
// TranslateTts: GET translate_tts?q=…&tl=…
// ─────────────────────────────────────────────────────────────────────────────

pub struct TranslateTts {
    agent: Agent,
    endpoint: String,
    user_agent: String,
}

impl TranslateTts {
    pub fn new(endpoint: impl Into<String>, user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self { agent: agent(timeout), endpoint: endpoint.into(), user_agent: user_agent.into() }
    }
}

impl Synthesizer for TranslateTts {
    fn name(&self) -> &str {
        "translate"
    }

    fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Vec<u8>> {
        debug!("GET {} ({} chars, '{}')", self.endpoint, request.text.chars().count(), request.language);
        let response = self
            .agent
            .get(&self.endpoint)
            .query("ie", "UTF-8")
            .query("q", request.text)
            .query("tl", request.language)
            .query("client", "tw-ob")
            .header("User-Agent", &self.user_agent)
            .call()
            .with_context(|| format!("Request to {} failed", self.endpoint))?;
        read_audio(response, &self.endpoint)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SsmlEndpoint: POST application/ssml+xml
// ─────────────────────────────────────────────────────────────────────────────

pub struct SsmlEndpoint {
    agent: Agent,
    url: String,
    headers: BTreeMap<String, String>,
}

impl SsmlEndpoint {
    pub fn new(url: impl Into<String>, headers: BTreeMap<String, String>, timeout: Duration) -> Self {
        Self { agent: agent(timeout), url: url.into(), headers }
    }
}

impl Synthesizer for SsmlEndpoint {
    fn name(&self) -> &str {
        "ssml"
    }

    fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Vec<u8>> {
        debug!("POST {} ({} bytes of markup)", self.url, request.markup.len());
        let mut builder = self
            .agent
            .post(&self.url)
            .header("Content-Type", "application/ssml+xml");
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder
            .send(request.markup.as_bytes())
            .with_context(|| format!("Request to {} failed", self.url))?;
        read_audio(response, &self.url)
    }
}

/// Build the configured backend.
pub fn from_settings(settings: &SynthSettings) -> Result<Box<dyn Synthesizer>> {
    let timeout = Duration::from_secs(settings.timeout_secs);
    match settings.backend {
        Backend::Translate => Ok(Box::new(TranslateTts::new(
            settings.translate_url.clone(),
            settings.user_agent.clone(),
            timeout,
        ))),
        Backend::Ssml => {
            let Some(url) = settings.ssml_url.as_deref().filter(|u| !u.trim().is_empty()) else {
                bail!("The ssml backend needs `synth.ssml_url` in the configuration");
            };
            Ok(Box::new(SsmlEndpoint::new(url, settings.headers.clone(), timeout)))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Write},
        net::TcpListener,
        sync::mpsc,
        thread,
    };

    use super::*;

    /// Serve one HTTP response on a loopback port; the raw request comes back
    /// over the channel.
    fn serve_once(body: &'static [u8]) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/tts", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            let header_end = loop {
                let n = stream.read(&mut buf).unwrap();
                raw.extend_from_slice(&buf[..n]);
                if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
                assert!(n > 0, "client closed before headers ended");
            };
            let head = String::from_utf8_lossy(&raw[..header_end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .map(|v| v.trim().parse::<usize>().unwrap())
                .unwrap_or(0);
            while raw.len() < header_end + length {
                let n = stream.read(&mut buf).unwrap();
                assert!(n > 0, "client closed before body ended");
                raw.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: audio/mpeg\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
            stream.write_all(body).unwrap();
            tx.send(String::from_utf8_lossy(&raw).into_owned()).unwrap();
        });
        (url, rx)
    }

    fn request<'a>(text: &'a str, markup: &'a str) -> SynthesisRequest<'a> {
        SynthesisRequest { text, markup, language: "en" }
    }

    #[test]
    fn test_translate_sends_query() {
        let (url, rx) = serve_once(b"ID3fake-mp3");
        let tts = TranslateTts::new(url, "mdspeak-test", Duration::from_secs(10));
        let audio = tts.synthesize(&request("Hello world", "<speak/>")).unwrap();
        assert_eq!(audio, b"ID3fake-mp3");

        let raw = rx.recv().unwrap();
        let line = raw.lines().next().unwrap();
        assert!(line.starts_with("GET /tts?"), "got: {}", line);
        assert!(line.contains("q=Hello"), "got: {}", line);
        assert!(line.contains("tl=en"), "got: {}", line);
        assert!(line.contains("client=tw-ob"), "got: {}", line);
        assert!(raw.contains("mdspeak-test"), "user agent missing: {}", raw);
    }

    #[test]
    fn test_ssml_posts_markup_with_headers() {
        let (url, rx) = serve_once(b"mp3");
        let headers = BTreeMap::from([("X-Api-Key".to_string(), "secret".to_string())]);
        let tts = SsmlEndpoint::new(url, headers, Duration::from_secs(10));
        let markup = "<speak xml:lang=\"en\">Hi</speak>";
        tts.synthesize(&request("Hi", markup)).unwrap();

        let raw = rx.recv().unwrap();
        let lower = raw.to_lowercase();
        assert!(raw.starts_with("POST /tts"), "got: {}", raw);
        assert!(lower.contains("content-type: application/ssml+xml"), "got: {}", raw);
        assert!(lower.contains("x-api-key: secret"), "got: {}", raw);
        assert!(raw.ends_with(markup), "got: {}", raw);
    }

    #[test]
    fn test_empty_audio_is_an_error() {
        let (url, _rx) = serve_once(b"");
        let tts = TranslateTts::new(url, "mdspeak-test", Duration::from_secs(10));
        let err = tts.synthesize(&request("Hello", "")).unwrap_err();
        assert!(err.to_string().contains("no audio"), "got: {err:#}");
    }

    #[test]
    fn test_ssml_backend_needs_url() {
        let settings = SynthSettings { backend: Backend::Ssml, ssml_url: None, ..SynthSettings::default() };
        let err = from_settings(&settings).err().expect("missing url accepted");
        assert!(err.to_string().contains("ssml_url"), "got: {err:#}");
    }

    #[test]
    fn test_default_backend_is_translate() {
        let synth = from_settings(&SynthSettings::default()).unwrap();
        assert_eq!(synth.name(), "translate");
    }

    #[test]
    fn test_backend_names() {
        let b: Backend = serde_json::from_str("\"ssml\"").unwrap();
        assert_eq!(b, Backend::Ssml);
        assert_eq!(serde_json::to_string(&Backend::Translate).unwrap(), "\"translate\"");
    }
}
