//! Audioformate des Broadcasts
//!
//! Das Format bestimmt die Encoder-Argumente (Container und Codec) und den
//! `Content-Type`, mit dem der Transport den Stream ausliefert. Die
//! Nutzdaten selbst interpretiert die Engine nie.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BroadcastError;

/// Ausgabeformat des Encoders
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    /// MPEG-1 Layer III – von jedem Browser abspielbar
    #[default]
    Mp3,
    /// AAC im ADTS-Container
    Aac,
    /// Opus im Ogg-Container
    Opus,
    /// Verlustfrei, hohe Bandbreite
    Flac,
    /// Unkomprimiertes PCM
    Wav,
}

impl AudioFormat {
    pub const ALLE: [AudioFormat; 5] = [
        AudioFormat::Mp3,
        AudioFormat::Aac,
        AudioFormat::Opus,
        AudioFormat::Flac,
        AudioFormat::Wav,
    ];

    /// Kurzname (Konfiguration, Statistik, Logs)
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Aac => "aac",
            AudioFormat::Opus => "opus",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
        }
    }

    /// Container-Name fuer den Encoder (`{format}`)
    pub fn container(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Aac => "adts",
            AudioFormat::Opus => "ogg",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
        }
    }

    /// Codec-Name fuer den Encoder (`{codec}`)
    pub fn codec(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "libmp3lame",
            AudioFormat::Aac => "aac",
            AudioFormat::Opus => "libopus",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "pcm_s16le",
        }
    }

    /// HTTP `Content-Type` des Streams
    pub fn content_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Aac => "audio/aac",
            AudioFormat::Opus => "audio/ogg",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Wav => "audio/wav",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = BroadcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" | "mpeg" => Ok(AudioFormat::Mp3),
            "aac" | "adts" => Ok(AudioFormat::Aac),
            "opus" | "ogg" => Ok(AudioFormat::Opus),
            "flac" => Ok(AudioFormat::Flac),
            "wav" | "pcm" => Ok(AudioFormat::Wav),
            _ => Err(BroadcastError::UnbekanntesFormat(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsen_ignoriert_gross_kleinschreibung() {
        assert_eq!("MP3".parse::<AudioFormat>().unwrap(), AudioFormat::Mp3);
        assert_eq!(" Opus ".parse::<AudioFormat>().unwrap(), AudioFormat::Opus);
        assert_eq!("ogg".parse::<AudioFormat>().unwrap(), AudioFormat::Opus);
    }

    #[test]
    fn unbekanntes_format_ist_fehler() {
        let err = "midi".parse::<AudioFormat>().unwrap_err();
        assert!(matches!(err, BroadcastError::UnbekanntesFormat(ref f) if f == "midi"));
    }

    #[test]
    fn anzeige_und_parsen_passen_zusammen() {
        for format in AudioFormat::ALLE {
            assert_eq!(format.to_string().parse::<AudioFormat>().unwrap(), format);
        }
    }

    #[test]
    fn serde_snake_case() {
        let json = serde_json::to_string(&AudioFormat::Flac).unwrap();
        assert_eq!(json, "\"flac\"");
        let f: AudioFormat = serde_json::from_str("\"aac\"").unwrap();
        assert_eq!(f, AudioFormat::Aac);
    }

    #[test]
    fn content_types() {
        assert_eq!(AudioFormat::Mp3.content_type(), "audio/mpeg");
        assert_eq!(AudioFormat::Opus.container(), "ogg");
    }
}
