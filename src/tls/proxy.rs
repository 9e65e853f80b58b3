use super::{ProbeError, ProbeTarget};
use base64::{Engine, engine::general_purpose::STANDARD};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tracing::debug;
use url::{Host, Url};

// upper bound for the proxy's response head
const MAX_RESPONSE_HEAD: usize = 8 * 1024;

/// Open a tunnel to `target` through an HTTP CONNECT proxy
///
/// Credentials embedded in the proxy URL are sent as basic auth. The returned
/// stream is positioned right after the proxy's response head.
///
/// # Errors
///
/// Returns `ProbeError::Connect` if the proxy is unreachable and
/// `ProbeError::Proxy` if it refuses or garbles the CONNECT exchange
pub async fn connect(proxy: &Url, target: &ProbeTarget) -> Result<TcpStream, ProbeError> {
    let addr = target.authority();
    let proxy_error = |reason: String| ProbeError::Proxy {
        proxy: redacted(proxy),
        addr: addr.clone(),
        reason,
    };

    let host = match proxy.host() {
        Some(Host::Ipv6(ip)) => ip.to_string(),
        Some(host) => host.to_string(),
        None => return Err(proxy_error("proxy URL has no host".to_string())),
    };
    let port = proxy.port_or_known_default().unwrap_or(80);

    let mut stream = TcpStream::connect((host.as_str(), port))
        .await
        .map_err(|source| ProbeError::Connect {
            addr: redacted(proxy),
            source,
        })?;

    let request = connect_request(proxy, &addr);
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| proxy_error(format!("failed to send CONNECT: {e}")))?;

    let head = read_response_head(&mut stream)
        .await
        .map_err(proxy_error)?;
    let status = parse_status(&head).map_err(proxy_error)?;
    if !(200..300).contains(&status) {
        return Err(proxy_error(format!("proxy answered CONNECT with {status}")));
    }

    debug!(proxy = %redacted(proxy), target = %addr, status, "proxy tunnel established");
    Ok(stream)
}

fn connect_request(proxy: &Url, addr: &str) -> String {
    let mut request = format!("CONNECT {addr} HTTP/1.1\r\nHost: {addr}\r\n");
    if !proxy.username().is_empty() {
        let credentials = format!(
            "{}:{}",
            proxy.username(),
            proxy.password().unwrap_or_default()
        );
        request.push_str("Proxy-Authorization: Basic ");
        request.push_str(&STANDARD.encode(credentials));
        request.push_str("\r\n");
    }
    request.push_str("\r\n");
    request
}

async fn read_response_head(stream: &mut TcpStream) -> Result<String, String> {
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];

    // byte at a time so nothing past the head is consumed
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_RESPONSE_HEAD {
            return Err(format!(
                "response head exceeds {MAX_RESPONSE_HEAD} bytes"
            ));
        }
        let read = stream
            .read(&mut byte)
            .await
            .map_err(|e| format!("failed to read CONNECT response: {e}"))?;
        if read == 0 {
            return Err("connection closed before CONNECT response completed".to_string());
        }
        head.extend_from_slice(&byte);
    }

    String::from_utf8(head).map_err(|_| "CONNECT response is not valid UTF-8".to_string())
}

fn parse_status(head: &str) -> Result<u16, String> {
    let status_line = head.lines().next().unwrap_or_default();
    let mut parts = status_line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") => code
            .parse::<u16>()
            .map_err(|_| format!("invalid status line: {status_line}")),
        _ => Err(format!("invalid status line: {status_line}")),
    }
}

/// Proxy URL without its password, safe for logs and error messages
fn redacted(proxy: &Url) -> String {
    let mut url = proxy.clone();
    if url.password().is_some() && url.set_password(Some("xxxxx")).is_err() {
        return format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());
    }
    url.to_string()
}
