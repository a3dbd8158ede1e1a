//! Leser-Seite einer Consumer-Queue fuer den Transport
//!
//! Der Transport entnimmt Eintraege in FIFO-Reihenfolge. Keepalives
//! (Sequenz-ID -1) werden mitgeliefert; wer sie nicht auf die Leitung
//! schreiben will, nutzt [`ConsumerDrain::naechster_block`].

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, Stream};
use roomcast_core::ConsumerId;

use crate::chunk::{ist_keepalive_eintrag, QueueEintrag};
use crate::queue::ConsumerQueue;

/// Entnahme-Handle fuer genau einen Consumer
#[derive(Debug, Clone)]
pub struct ConsumerDrain {
    id: ConsumerId,
    queue: ConsumerQueue,
}

impl ConsumerDrain {
    pub fn neu(id: ConsumerId, queue: ConsumerQueue) -> Self {
        Self { id, queue }
    }

    pub fn id(&self) -> ConsumerId {
        self.id
    }

    /// Wartet auf den naechsten Eintrag (auch Keepalives)
    ///
    /// `None` sobald der Consumer entfernt und die Queue leer ist.
    pub async fn next_chunk(&self) -> Option<QueueEintrag> {
        self.queue.recv().await
    }

    /// Nicht-blockierende Entnahme
    pub fn try_next_chunk(&self) -> Option<QueueEintrag> {
        self.queue.try_pop()
    }

    /// Wartet auf Audiodaten und fasst bereits wartende Eintraege zusammen
    ///
    /// Keepalives werden entnommen, aber nicht ausgeliefert. Der Block
    /// wird nicht weiter aufgefuellt, sobald `max_bytes` erreicht ist.
    pub async fn naechster_block(&self, max_bytes: usize) -> Option<Bytes> {
        let erster = loop {
            let eintrag = self.queue.recv().await?;
            if !ist_keepalive_eintrag(&eintrag) {
                break eintrag.1;
            }
        };

        if erster.len() >= max_bytes {
            return Some(erster);
        }

        let mut block: Option<BytesMut> = None;
        let mut laenge = erster.len();
        while laenge < max_bytes {
            let Some(eintrag) = self.queue.try_pop() else {
                break;
            };
            if ist_keepalive_eintrag(&eintrag) {
                continue;
            }
            let puffer = block.get_or_insert_with(|| {
                let mut b = BytesMut::with_capacity(max_bytes);
                b.extend_from_slice(&erster);
                b
            });
            puffer.extend_from_slice(&eintrag.1);
            laenge += eintrag.1.len();
        }

        Some(match block {
            Some(puffer) => puffer.freeze(),
            None => erster,
        })
    }

    /// Alle Eintraege als asynchroner Stream
    pub fn into_stream(self) -> impl Stream<Item = QueueEintrag> + Send + 'static {
        stream::unfold(self, |drain| async move {
            let eintrag = drain.next_chunk().await?;
            Some((eintrag, drain))
        })
    }

    /// Nur Audiodaten, zu Bloecken von hoechstens etwa `max_bytes` gebuendelt
    pub fn into_byte_stream(self, max_bytes: usize) -> impl Stream<Item = Bytes> + Send + 'static {
        stream::unfold(self, move |drain| async move {
            let block = drain.naechster_block(max_bytes).await?;
            Some((block, drain))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::KEEPALIVE_SEQUENZ;
    use futures_util::StreamExt;

    fn drain(kapazitaet: usize) -> (ConsumerDrain, ConsumerQueue) {
        let queue = ConsumerQueue::neu(kapazitaet);
        (ConsumerDrain::neu(ConsumerId::new(), queue.clone()), queue)
    }

    #[tokio::test]
    async fn liefert_fifo_inklusive_keepalive() {
        let (d, q) = drain(8);
        q.try_push((0, Bytes::from_static(b"a"))).unwrap();
        q.try_push((KEEPALIVE_SEQUENZ, Bytes::new())).unwrap();
        q.try_push((1, Bytes::from_static(b"b"))).unwrap();
        q.close();

        let ids: Vec<i64> = d.into_stream().map(|(seq, _)| seq).collect().await;
        assert_eq!(ids, vec![0, -1, 1]);
    }

    #[tokio::test]
    async fn block_ueberspringt_keepalives_und_buendelt() {
        let (d, q) = drain(8);
        q.try_push((KEEPALIVE_SEQUENZ, Bytes::new())).unwrap();
        q.try_push((0, Bytes::from_static(b"ab"))).unwrap();
        q.try_push((KEEPALIVE_SEQUENZ, Bytes::new())).unwrap();
        q.try_push((1, Bytes::from_static(b"cd"))).unwrap();
        q.try_push((2, Bytes::from_static(b"ef"))).unwrap();

        assert_eq!(d.naechster_block(4).await.unwrap(), Bytes::from_static(b"abcd"));
        assert_eq!(d.naechster_block(4).await.unwrap(), Bytes::from_static(b"ef"));
        assert!(d.try_next_chunk().is_none());
    }

    #[tokio::test]
    async fn byte_stream_endet_nach_entfernen() {
        let (d, q) = drain(8);
        q.try_push((0, Bytes::from_static(b"xy"))).unwrap();
        q.try_push((KEEPALIVE_SEQUENZ, Bytes::new())).unwrap();
        q.close();

        let bloecke: Vec<Bytes> = d.into_byte_stream(1024).collect().await;
        assert_eq!(bloecke, vec![Bytes::from_static(b"xy")]);
    }

    #[test]
    fn try_next_chunk_auf_leerer_queue() {
        let (d, _q) = drain(2);
        assert!(d.try_next_chunk().is_none());
    }
}
