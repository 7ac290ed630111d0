// Built-in Tier1 heuristic
// Used when the runtime is unavailable, no module is configured, or a
// module call fails. Results are always marked degraded.

use crate::config::types::Result;
use crate::core::types::AnalysisRequest;
use crate::tier1::{Tier1Result, Tier1Source, TierExecutor};
use std::time::{Duration, Instant};

/// Literal byte signatures matched verbatim
struct LiteralSignature {
    name: &'static str,
    needle: &'static [u8],
    weight: f32,
}

const LITERAL_SIGNATURES: &[LiteralSignature] = &[
    LiteralSignature {
        name: "EICAR-Test-File",
        needle: b"EICAR-STANDARD-ANTIVIRUS-TEST-FILE",
        weight: 1.0,
    },
    LiteralSignature {
        name: "Win32-RemoteThread",
        needle: b"CreateRemoteThread",
        weight: 0.3,
    },
    LiteralSignature {
        name: "Win32-RemoteAlloc",
        needle: b"VirtualAllocEx",
        weight: 0.3,
    },
    LiteralSignature {
        name: "Win32-ProcessWrite",
        needle: b"WriteProcessMemory",
        weight: 0.3,
    },
    LiteralSignature {
        name: "Shell-DevTcp",
        needle: b"/dev/tcp/",
        weight: 0.45,
    },
    LiteralSignature {
        name: "Shell-InteractiveRedirect",
        needle: b"bash -i >&",
        weight: 0.45,
    },
    LiteralSignature {
        name: "Shell-PipeToShell",
        needle: b"| sh",
        weight: 0.25,
    },
    LiteralSignature {
        name: "Win-ShadowCopyDelete",
        needle: b"vssadmin delete shadows",
        weight: 0.5,
    },
];

/// Keywords matched against the letters-only, lowercased content
const SUSPICIOUS_KEYWORDS: &[&str] = &[
    "eval",
    "exec",
    "shell",
    "cmd",
    "createprocess",
    "virtualalloc",
    "writeprocessmemory",
    "createremotethread",
    "loadlibrary",
    "getprocaddress",
    "http",
    "https",
    "ftp",
    "powershell",
    "cmdexe",
    "bash",
    "ransomware",
    "cryptolocker",
    "wannacry",
];

/// Each keyword hit adds this much pattern score
const KEYWORD_WEIGHT: f32 = 0.1;

const EXECUTABLE_EXTENSIONS: &[&str] = &[
    "exe", "scr", "com", "bat", "cmd", "pif", "vbs", "js", "jar", "msi", "ps1", "sh", "elf", "bin",
];
const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "jpg", "jpeg", "png", "gif", "zip",
    "mp3", "mp4",
];

/// Shannon entropy in bits per byte
pub fn shannon_entropy(bytes: &[u8]) -> f32 {
    if bytes.is_empty() {
        return 0.0;
    }
    let mut counts = [0u32; 256];
    for &b in bytes {
        counts[b as usize] += 1;
    }
    let len = bytes.len() as f32;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f32 / len;
            -p * p.log2()
        })
        .sum()
}

/// Header and container findings
fn header_findings(bytes: &[u8], filename: &str, entropy: f32) -> Vec<String> {
    let mut findings = Vec::new();

    if bytes.starts_with(b"MZ") {
        findings.push("Windows PE executable".to_string());
    }
    if bytes.starts_with(b"\x7fELF") {
        findings.push("Linux ELF executable".to_string());
    }
    let macho = [
        [0xFE, 0xED, 0xFA, 0xCE],
        [0xFE, 0xED, 0xFA, 0xCF],
        [0xCE, 0xFA, 0xED, 0xFE],
        [0xCF, 0xFA, 0xED, 0xFE],
    ];
    if macho.iter().any(|magic| bytes.starts_with(magic)) {
        findings.push("Mach-O executable".to_string());
    }
    if bytes.starts_with(b"#!") {
        findings.push("Script with shebang".to_string());
    }
    if entropy > 7.0 {
        findings.push(format!("High entropy ({:.2}), possible packing or encryption", entropy));
    }
    if contains(bytes, b"http://") || contains(bytes, b"https://") {
        findings.push("Embedded URLs".to_string());
    }
    if has_double_extension(filename) {
        findings.push(format!("Deceptive double extension in '{}'", filename));
    }

    findings
}

fn has_double_extension(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    let parts: Vec<&str> = lower.rsplit('.').take(3).collect();
    if parts.len() < 3 {
        return false;
    }
    EXECUTABLE_EXTENSIONS.contains(&parts[0]) && DOCUMENT_EXTENSIONS.contains(&parts[1])
}

fn is_executable_header(bytes: &[u8]) -> bool {
    bytes.starts_with(b"MZ")
        || bytes.starts_with(b"\x7fELF")
        || bytes.starts_with(&[0xCF, 0xFA, 0xED, 0xFE])
        || bytes.starts_with(&[0xCE, 0xFA, 0xED, 0xFE])
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

/// Letters only, lowercased
fn normalize_letters(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|b| b.is_ascii_alphabetic())
        .map(|b| b.to_ascii_lowercase() as char)
        .collect()
}

/// Content model: entropy bands, small-and-dense files, executable headers
fn ml_score(bytes: &[u8], entropy: f32) -> f32 {
    let entropy_score: f32 = if entropy > 7.0 {
        0.8
    } else if entropy > 6.0 {
        0.5
    } else {
        0.0
    };
    let size_score = if bytes.len() < 10_000 && entropy > 6.5 {
        0.7
    } else {
        0.0
    };
    let header_score = if is_executable_header(bytes) { 0.2 } else { 0.0 };

    ((entropy_score + size_score) / 2.0 + header_score).clamp(0.0, 1.0)
}

/// Pattern, entropy, and header heuristic
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicExecutor;

impl HeuristicExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Pure analysis of content and filename
    pub fn analyze(&self, bytes: &[u8], filename: &str) -> Tier1Result {
        let started = Instant::now();
        let mut findings = Vec::new();
        let mut pattern = 0.0f32;
        let mut hits = 0u32;

        for signature in LITERAL_SIGNATURES {
            if contains(bytes, signature.needle) {
                pattern += signature.weight;
                hits += 1;
                findings.push(format!("Signature: {}", signature.name));
            }
        }

        let letters = normalize_letters(bytes);
        for keyword in SUSPICIOUS_KEYWORDS {
            if letters.contains(keyword) {
                pattern += KEYWORD_WEIGHT;
                hits += 1;
                findings.push(format!("Keyword: {}", keyword));
            }
        }

        let entropy = shannon_entropy(bytes);
        let headers = header_findings(bytes, filename, entropy);
        hits += headers.len() as u32;
        findings.extend(headers);

        Tier1Result {
            pattern_score: pattern.clamp(0.0, 1.0),
            ml_score: ml_score(bytes, entropy),
            detected_pattern_count: hits,
            execution_time_us: started.elapsed().as_micros() as u64,
            error_code: 0,
            timed_out: false,
            degraded: true,
            source: Tier1Source::Heuristic,
            findings,
        }
    }
}

impl TierExecutor for HeuristicExecutor {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn execute(&self, request: &AnalysisRequest, _budget: Duration) -> Result<Tier1Result> {
        Ok(self.analyze(request.content(), request.filename()))
    }
}
