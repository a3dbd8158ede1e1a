//! Integration-Tests fuer die BroadcastEngine (sh als Encoder-Ersatz)

#![cfg(unix)]

use roomcast_broadcast::{
    AudioFormat, BroadcastConfig, BroadcastEngine, CaptureConfig, EncoderConfig,
};
use roomcast_core::BroadcastEvent;
use std::time::Duration;

/// Engine mit einem Shell-Skript als Encoder; `$0` ist das Geraet
fn engine(skript: &str) -> BroadcastEngine {
    let config = BroadcastConfig {
        capture: CaptureConfig {
            encoder: EncoderConfig {
                programm: "sh".into(),
                argumente: vec!["-c".into(), skript.into(), "{device}".into()],
                geraete_programm: "sh".into(),
                geraete_argumente: vec!["-c".into(), "echo quelle-a; echo quelle-b".into()],
            },
            anlaufzeit: Duration::from_secs(3),
            lese_timeout: Duration::from_millis(500),
            lese_groesse: 4,
            stop_timeout: Duration::from_secs(1),
            ..CaptureConfig::default()
        },
        ..BroadcastConfig::default()
    };
    let engine = BroadcastEngine::neu(config);
    engine.starten();
    engine
}

const DAUERLAEUFER: &str = "printf 'hallo-welt'; exec sleep 30";

async fn warten_bis(mut bedingung: impl FnMut() -> bool) -> bool {
    let ende = tokio::time::Instant::now() + Duration::from_secs(3);
    while tokio::time::Instant::now() < ende {
        if bedingung() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    bedingung()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ungueltiges_geraet_liefert_false() {
    let engine = engine("echo \"Quelle $0 nicht gefunden\" >&2; exit 1");

    assert!(!engine.start_broadcast("gibt-es-nicht", AudioFormat::Mp3).await);

    let stats = engine.stats();
    assert!(!stats.running);
    assert_eq!(stats.chunks_read, 0);
    assert!(stats.last_error.is_some());
    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn consumer_erhaelt_den_stream() {
    let engine = engine(DAUERLAEUFER);
    let (id, _queue) = engine.register_consumer("standard");
    let drain = engine.drain_consumer(&id).expect("Consumer muss registriert sein");

    assert!(engine.start_broadcast("default", AudioFormat::Mp3).await);
    assert!(engine.stats().running);
    assert_eq!(engine.aktives_format(), Some(AudioFormat::Mp3));

    let mut empfangen = Vec::new();
    while empfangen.len() < 10 {
        let block = tokio::time::timeout(Duration::from_secs(3), drain.naechster_block(1024))
            .await
            .expect("Daten muessen ankommen")
            .expect("Queue darf nicht geschlossen sein");
        empfangen.extend_from_slice(&block);
    }
    assert_eq!(empfangen, b"hallo-welt");

    let stats = engine.stats();
    assert_eq!(stats.total_bytes, 10);
    assert_eq!(stats.chunks_read, 3);
    assert_eq!(stats.consumer(&id).unwrap().bytes_sent, 10);
    assert_eq!(engine.retransmit_lookup(0).as_deref(), Some(&b"hall"[..]));

    engine.stop_broadcast().await;
    let stats = engine.stats();
    assert!(!stats.running);
    assert!(stats.last_error.is_none());
    assert_eq!(stats.registry_size, 1, "Stop entfernt keine Consumer");
    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn formatkonflikt_mit_consumern_wird_abgelehnt() {
    let engine = engine(DAUERLAEUFER);
    engine.register_consumer("standard");

    assert!(engine.start_broadcast("default", AudioFormat::Mp3).await);
    assert!(!engine.start_broadcast("default", AudioFormat::Opus).await);
    let stats = engine.stats();
    assert_eq!(stats.format.as_deref(), Some("mp3"));
    assert!(stats.running);
    let fehler = stats.last_error.expect("Konflikt muss sichtbar sein");
    assert!(fehler.contains("Formatkonflikt"), "{fehler}");
    assert!(fehler.contains("aktiv=mp3") && fehler.contains("angefordert=opus"));

    // Gleiches Format: Neustart ist erlaubt und loescht den Fehler
    assert!(engine.start_broadcast("default", AudioFormat::Mp3).await);
    assert!(engine.stats().running);
    assert!(engine.stats().last_error.is_none());
    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn formatwechsel_ohne_consumer_erlaubt() {
    let engine = engine(DAUERLAEUFER);

    assert!(engine.start_broadcast("default", AudioFormat::Mp3).await);
    assert!(engine.start_broadcast("default", AudioFormat::Flac).await);
    assert_eq!(engine.aktives_format(), Some(AudioFormat::Flac));
    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn encoder_ende_ist_fatal_und_sichtbar() {
    let engine = engine("printf 'abcd'");
    let mut ereignisse = engine.events();
    let (id, _queue) = engine.register_consumer("standard");

    assert!(engine.start_broadcast("default", AudioFormat::Mp3).await);
    assert!(warten_bis(|| !engine.stats().running).await);

    let stats = engine.stats();
    assert!(stats.last_error.unwrap().contains("EOF"));
    assert_eq!(stats.registry_size, 1);

    let mut gestoppt_mit_grund = false;
    while let Ok(ereignis) = ereignisse.try_recv() {
        if let BroadcastEvent::BroadcastGestoppt { grund: Some(_), .. } = ereignis {
            gestoppt_mit_grund = true;
        }
    }
    assert!(gestoppt_mit_grund);
    assert!(engine.unregister_consumer(&id));
    engine.shutdown().await;
}

#[tokio::test]
async fn geraete_auflisten() {
    let engine = engine(DAUERLAEUFER);
    let geraete = engine.list_devices().await.unwrap();
    assert_eq!(geraete, vec!["quelle-a".to_string(), "quelle-b".to_string()]);
    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nach_shutdown_kein_start_mehr() {
    let engine = engine(DAUERLAEUFER);
    engine.shutdown().await;

    assert!(!engine.start_broadcast("default", AudioFormat::Mp3).await);
    assert!(engine.laufende_tasks().is_empty());
}
