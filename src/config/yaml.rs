use serde::Deserialize;
use std::path::Path;

use crate::core::realtime::PoolExhaustion;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Environment
/// variables override any values specified here.
///
/// # Example YAML structure
/// ```yaml
/// openai:
///   api_key: "sk-..."
///   url: "wss://api.openai.com/v1/realtime"
///   model: "gpt-realtime"
///   mode: "transcription"
///   voice: "alloy"
///   instructions: "You are a helpful assistant."
///   transcription_model: "whisper-1"
///
/// audio:
///   input_format: "pcm16"
///   output_format: "pcm16"
///   min_commit_ms: 100
///
/// turn_detection:
///   threshold: 0.5
///   prefix_padding_ms: 300
///   silence_duration_ms: 500
///
/// connection:
///   connect_timeout_ms: 10000
///   shutdown_grace_ms: 5000
///   worker_threads: 8
///   buffer_size: 65536
///   buffer_pool_capacity: 100
///   pool_exhaustion: "allocate"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub openai: Option<OpenAIYaml>,
    pub audio: Option<AudioYaml>,
    pub turn_detection: Option<TurnDetectionYaml>,
    pub connection: Option<ConnectionYaml>,
}

/// OpenAI credentials and session settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OpenAIYaml {
    pub api_key: Option<String>,
    pub url: Option<String>,
    pub model: Option<String>,
    /// "conversation" or "transcription"
    pub mode: Option<String>,
    pub voice: Option<String>,
    pub instructions: Option<String>,
    pub transcription_model: Option<String>,
}

/// Audio settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AudioYaml {
    /// "pcm16", "g711_ulaw" or "g711_alaw"
    pub input_format: Option<String>,
    pub output_format: Option<String>,
    pub min_commit_ms: Option<u64>,
}

/// Server VAD settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TurnDetectionYaml {
    pub threshold: Option<f32>,
    pub prefix_padding_ms: Option<u32>,
    pub silence_duration_ms: Option<u32>,
}

/// Transport and resource settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ConnectionYaml {
    pub connect_timeout_ms: Option<u64>,
    pub shutdown_grace_ms: Option<u64>,
    pub worker_threads: Option<usize>,
    pub buffer_size: Option<usize>,
    pub buffer_pool_capacity: Option<usize>,
    pub pool_exhaustion: Option<PoolExhaustion>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Fields have invalid types
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
openai:
  api_key: "sk-test"
  url: "ws://localhost:9000/v1/realtime"
  model: "gpt-realtime-mini"
  mode: "transcription"
  voice: "marin"
  transcription_model: "gpt-4o-transcribe"

audio:
  input_format: "g711_ulaw"
  min_commit_ms: 200

turn_detection:
  threshold: 0.7
  silence_duration_ms: 800

connection:
  connect_timeout_ms: 2500
  worker_threads: 4
  buffer_size: 32768
  pool_exhaustion: "reject"
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let openai = config.openai.as_ref().unwrap();
        assert_eq!(openai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(openai.model.as_deref(), Some("gpt-realtime-mini"));
        assert_eq!(openai.mode.as_deref(), Some("transcription"));
        assert!(openai.instructions.is_none());

        let audio = config.audio.as_ref().unwrap();
        assert_eq!(audio.input_format.as_deref(), Some("g711_ulaw"));
        assert_eq!(audio.min_commit_ms, Some(200));

        let vad = config.turn_detection.as_ref().unwrap();
        assert_eq!(vad.threshold, Some(0.7));
        assert!(vad.prefix_padding_ms.is_none());

        let connection = config.connection.as_ref().unwrap();
        assert_eq!(connection.connect_timeout_ms, Some(2500));
        assert_eq!(connection.pool_exhaustion, Some(PoolExhaustion::Reject));
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("").unwrap();

        assert!(config.openai.is_none());
        assert!(config.audio.is_none());
        assert!(config.turn_detection.is_none());
        assert!(config.connection.is_none());
    }

    #[test]
    fn test_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        fs::write(
            &config_path,
            r#"
openai:
  api_key: "sk-file"
"#,
        )
        .unwrap();

        let config = YamlConfig::from_file(&config_path).unwrap();
        assert_eq!(
            config.openai.unwrap().api_key,
            Some("sk-file".to_string())
        );
    }

    #[test]
    fn test_from_file_not_found() {
        let result = YamlConfig::from_file(Path::new("/nonexistent/config.yaml"));

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");

        fs::write(&config_path, "invalid: yaml: content:").unwrap();

        let result = YamlConfig::from_file(&config_path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML")
        );
    }

    #[test]
    fn test_invalid_pool_policy() {
        let yaml = r#"
connection:
  pool_exhaustion: "block"
"#;
        assert!(serde_yaml::from_str::<YamlConfig>(yaml).is_err());
    }
}
