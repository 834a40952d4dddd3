//! Gemini Live wire format (JSON over WebSocket).
//!
//! Outbound: one `setup` message, then `realtimeInput` audio messages.
//! Inbound: `setupComplete`, `serverContent` (model audio, transcriptions,
//! interruption / turn flags) and `goAway`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::ServerMessage;
use crate::audio::{DecodeError, EncodedChunk};
use crate::config::LiveConfig;

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SetupMessage<'a> {
    setup: Setup<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup<'a> {
    model: &'a str,
    generation_config: GenerationConfig<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_transcription: Option<Empty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_audio_transcription: Option<Empty>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_modalities: [&'static str; 1],
    speech_config: SpeechConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig<'a> {
    voice_config: VoiceConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig<'a> {
    prebuilt_voice_config: PrebuiltVoiceConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig<'a> {
    voice_name: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Empty {}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInputMessage<'a> {
    realtime_input: RealtimeInput<'a>,
}

#[derive(Serialize)]
struct RealtimeInput<'a> {
    audio: Blob<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Blob<'a> {
    data: String,
    mime_type: &'a str,
}

/// The first message of a session: model, audio response modality, voice,
/// system instruction and transcription flags.
pub fn setup_message(config: &LiveConfig) -> Result<String, serde_json::Error> {
    let system_instruction = (!config.system_instruction.is_empty()).then(|| Content {
        parts: [TextPart {
            text: &config.system_instruction,
        }],
    });

    let message = SetupMessage {
        setup: Setup {
            model: &config.model,
            generation_config: GenerationConfig {
                response_modalities: ["AUDIO"],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: &config.voice,
                        },
                    },
                },
            },
            system_instruction,
            input_audio_transcription: config.input_transcription.then_some(Empty {}),
            output_audio_transcription: config.output_transcription.then_some(Empty {}),
        },
    };
    serde_json::to_string(&message)
}

/// One captured chunk as a `realtimeInput` message with base64 data.
pub fn realtime_input_message(chunk: &EncodedChunk) -> Result<String, serde_json::Error> {
    serde_json::to_string(&RealtimeInputMessage {
        realtime_input: RealtimeInput {
            audio: Blob {
                data: BASE64.encode(&chunk.data),
                mime_type: &chunk.mime_type,
            },
        },
    })
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LiveServerMessage {
    setup_complete: Option<serde_json::Value>,
    server_content: Option<ServerContent>,
    go_away: Option<GoAway>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ServerContent {
    model_turn: Option<ModelTurn>,
    input_transcription: Option<Transcription>,
    output_transcription: Option<Transcription>,
    interrupted: bool,
    turn_complete: bool,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ModelTurn {
    parts: Vec<Part>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    data: String,
    mime_type: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Transcription {
    text: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct GoAway {
    time_left: Option<String>,
}

/// A parsed inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    SetupComplete,
    Content(ServerMessage),
    /// The service will close the connection soon.
    GoAway(Option<String>),
    /// Valid JSON with nothing the session acts on.
    Other,
}

/// Parse one inbound text frame.
///
/// Audio parts whose base64 does not decode are dropped with a warning; the
/// rest of the message is kept.
pub fn parse_server_frame(text: &str) -> Result<ServerFrame, serde_json::Error> {
    let msg: LiveServerMessage = serde_json::from_str(text)?;

    if msg.setup_complete.is_some() {
        return Ok(ServerFrame::SetupComplete);
    }

    if let Some(content) = msg.server_content {
        let mut out = ServerMessage {
            interrupted: content.interrupted,
            turn_complete: content.turn_complete,
            input_transcript: content.input_transcription.and_then(|t| t.text),
            output_transcript: content.output_transcription.and_then(|t| t.text),
            ..ServerMessage::default()
        };

        let parts = content.model_turn.map(|t| t.parts).unwrap_or_default();
        for inline in parts.into_iter().filter_map(|p| p.inline_data) {
            let is_pcm = inline
                .mime_type
                .as_deref()
                .map_or(true, |m| m.starts_with("audio/pcm"));
            if !is_pcm {
                log::debug!("transport: skipping non-PCM inline data {:?}", inline.mime_type);
                continue;
            }
            match BASE64.decode(inline.data.as_bytes()) {
                Ok(bytes) => out.audio_chunks.push(bytes),
                Err(e) => {
                    let err = DecodeError::Base64(e.to_string());
                    log::warn!("transport: dropping audio part: {err}");
                }
            }
        }

        return Ok(ServerFrame::Content(out));
    }

    if let Some(go_away) = msg.go_away {
        return Ok(ServerFrame::GoAway(go_away.time_left));
    }

    Ok(ServerFrame::Other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn setup_message_carries_session_options() {
        let config = LiveConfig {
            model: "models/test-model".into(),
            voice: "Puck".into(),
            system_instruction: "Be brief.".into(),
            input_transcription: true,
            output_transcription: false,
            ..LiveConfig::default()
        };
        let v: Value = serde_json::from_str(&setup_message(&config).unwrap()).unwrap();
        let setup = &v["setup"];

        assert_eq!(setup["model"], "models/test-model");
        assert_eq!(setup["generationConfig"]["responseModalities"], json!(["AUDIO"]));
        assert_eq!(
            setup["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Puck"
        );
        assert_eq!(setup["systemInstruction"]["parts"][0]["text"], "Be brief.");
        assert_eq!(setup["inputAudioTranscription"], json!({}));
        assert!(setup.get("outputAudioTranscription").is_none());
    }

    #[test]
    fn empty_system_instruction_is_omitted() {
        let config = LiveConfig {
            system_instruction: String::new(),
            ..LiveConfig::default()
        };
        let v: Value = serde_json::from_str(&setup_message(&config).unwrap()).unwrap();
        assert!(v["setup"].get("systemInstruction").is_none());
    }

    #[test]
    fn realtime_input_is_base64_with_mime_type() {
        let chunk = EncodedChunk {
            data: vec![0x00, 0x40],
            mime_type: "audio/pcm;rate=16000".into(),
        };
        let v: Value = serde_json::from_str(&realtime_input_message(&chunk).unwrap()).unwrap();
        assert_eq!(v["realtimeInput"]["audio"]["data"], "AEA=");
        assert_eq!(v["realtimeInput"]["audio"]["mimeType"], "audio/pcm;rate=16000");
    }

    #[test]
    fn setup_complete_is_recognised() {
        assert_eq!(
            parse_server_frame(r#"{"setupComplete":{}}"#).unwrap(),
            ServerFrame::SetupComplete
        );
    }

    #[test]
    fn model_audio_is_decoded() {
        let frame = parse_server_frame(
            r#"{"serverContent":{"modelTurn":{"parts":[
                {"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AEA="}},
                {"inlineData":{"data":"AMA="}}
            ]}}}"#,
        )
        .unwrap();
        let ServerFrame::Content(msg) = frame else {
            panic!("expected content, got {frame:?}");
        };
        assert_eq!(msg.audio_chunks, vec![vec![0x00, 0x40], vec![0x00, 0xC0]]);
        assert!(!msg.interrupted);
    }

    #[test]
    fn bad_base64_part_is_dropped() {
        let frame = parse_server_frame(
            r#"{"serverContent":{"modelTurn":{"parts":[
                {"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"!!not base64!!"}},
                {"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AEA="}}
            ]}}}"#,
        )
        .unwrap();
        let ServerFrame::Content(msg) = frame else {
            panic!("expected content");
        };
        assert_eq!(msg.audio_chunks, vec![vec![0x00, 0x40]]);
    }

    #[test]
    fn transcripts_and_flags_are_mapped() {
        let frame = parse_server_frame(
            r#"{"serverContent":{
                "inputTranscription":{"text":"raise zone two"},
                "outputTranscription":{"text":"Setting zone two"},
                "interrupted":true,
                "turnComplete":true
            }}"#,
        )
        .unwrap();
        assert_eq!(
            frame,
            ServerFrame::Content(ServerMessage {
                audio_chunks: vec![],
                input_transcript: Some("raise zone two".into()),
                output_transcript: Some("Setting zone two".into()),
                interrupted: true,
                turn_complete: true,
            })
        );
    }

    #[test]
    fn go_away_and_unknown_frames() {
        assert_eq!(
            parse_server_frame(r#"{"goAway":{"timeLeft":"10s"}}"#).unwrap(),
            ServerFrame::GoAway(Some("10s".into()))
        );
        assert_eq!(
            parse_server_frame(r#"{"usageMetadata":{}}"#).unwrap(),
            ServerFrame::Other
        );
        assert!(parse_server_frame("not json").is_err());
    }
}
