//! ScatterFS Daemon - serving one host
//!
//! This crate wires a host together:
//! - [`DaemonContext`]: distributor, metadentry service, chunk storage and
//!   I/O pool of one host, constructed once at startup
//! - Request dispatch from encoded requests to encoded responses
//! - [`LoopbackTransport`]: an in-process transport over several daemons

pub mod context;
pub mod handler;
pub mod loopback;

pub use context::{DaemonContext, DaemonStats};
pub use loopback::LoopbackTransport;

#[cfg(test)]
mod tests {
    use super::*;
    use scatterfs_common::rpc::{ChunkRead, ChunkWrite, call};
    use scatterfs_common::{
        DistributorConfig, Error, FsConfig, Metadata, Request, Response, Transport,
    };
    use std::sync::atomic::Ordering;
    use tempfile::tempdir;

    fn single_host(dir: &std::path::Path) -> DaemonContext {
        let config = FsConfig {
            chunk_size: 4096,
            io_workers: 2,
            root_dir: dir.join("chunks"),
            metadata_file: dir.join("metadata.redb"),
            ..FsConfig::default()
        };
        DaemonContext::open(config).unwrap()
    }

    #[tokio::test]
    async fn test_root_exists_after_open() {
        let dir = tempdir().unwrap();
        let daemon = single_host(dir.path());
        let resp = daemon
            .dispatch(Request::Stat { path: "/".into() })
            .await;
        match resp {
            Response::Metadata(md) => assert!(md.is_dir()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_metadata_requests() {
        let dir = tempdir().unwrap();
        let daemon = single_host(dir.path());

        let create = Request::Create {
            path: "/f".into(),
            metadata: Metadata::file(0o644),
        };
        assert_eq!(daemon.dispatch(create.clone()).await, Response::Ok);
        match daemon.dispatch(create).await {
            Response::Error(e) => assert!(Error::from_rpc(0, e).to_string().contains("exists")),
            other => panic!("unexpected {other:?}"),
        }

        let grow = Request::UpdateSize {
            path: "/f".into(),
            io_size: 50,
            offset: 1000,
            append: false,
        };
        assert_eq!(daemon.dispatch(grow).await, Response::Size(1050));

        let shrink = Request::DecreaseSize {
            path: "/f".into(),
            size: 10,
        };
        assert_eq!(daemon.dispatch(shrink).await, Response::Size(10));
        assert_eq!(daemon.stats().errors.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_data_requests() {
        let dir = tempdir().unwrap();
        let daemon = single_host(dir.path());

        let write = Request::WriteData {
            path: "/d".into(),
            chunks: vec![
                ChunkWrite {
                    chunk_id: 0,
                    offset_in_chunk: 4000,
                    data: vec![1; 96],
                },
                ChunkWrite {
                    chunk_id: 1,
                    offset_in_chunk: 0,
                    data: vec![2; 4],
                },
            ],
        };
        assert_eq!(daemon.dispatch(write).await, Response::Written(100));

        let read = Request::ReadData {
            path: "/d".into(),
            chunks: vec![
                ChunkRead {
                    chunk_id: 1,
                    offset_in_chunk: 0,
                    len: 8,
                },
                ChunkRead {
                    chunk_id: 3,
                    offset_in_chunk: 0,
                    len: 16,
                },
            ],
        };
        let Response::Read(pieces) = daemon.dispatch(read).await else {
            panic!("expected read response");
        };
        assert_eq!(pieces[0].bytes_read, 4);
        assert_eq!(pieces[0].data, vec![2, 2, 2, 2, 0, 0, 0, 0]);
        assert_eq!(pieces[1].bytes_read, 0);
        assert_eq!(pieces[1].data, vec![0; 16]);

        let truncate = Request::TruncateData {
            path: "/d".into(),
            size: 4000,
        };
        assert_eq!(daemon.dispatch(truncate).await, Response::Ok);
        assert!(!daemon.storage().layout().chunk_path("/d", 1).unwrap().exists());

        assert_eq!(
            daemon
                .dispatch(Request::RemoveData { path: "/d".into() })
                .await,
            Response::Ok
        );
        assert!(!daemon.storage().layout().chunk_dir("/d").unwrap().exists());
    }

    #[tokio::test]
    async fn test_cross_boundary_read_rejected() {
        let dir = tempdir().unwrap();
        let daemon = single_host(dir.path());
        let read = Request::ReadData {
            path: "/d".into(),
            chunks: vec![ChunkRead {
                chunk_id: 0,
                offset_in_chunk: 4090,
                len: 10,
            }],
        };
        assert!(matches!(daemon.dispatch(read).await, Response::Error(_)));

        let wrapping = Request::ReadData {
            path: "/d".into(),
            chunks: vec![ChunkRead {
                chunk_id: 0,
                offset_in_chunk: 8,
                len: u64::MAX - 4,
            }],
        };
        assert!(matches!(daemon.dispatch(wrapping).await, Response::Error(_)));
    }

    #[tokio::test]
    async fn test_size_update_past_u64_max_rejected() {
        let dir = tempdir().unwrap();
        let daemon = single_host(dir.path());
        let create = Request::Create {
            path: "/f".into(),
            metadata: Metadata::file(0o644),
        };
        assert_eq!(daemon.dispatch(create).await, Response::Ok);

        let grow = Request::UpdateSize {
            path: "/f".into(),
            io_size: 5,
            offset: u64::MAX - 4,
            append: false,
        };
        match daemon.dispatch(grow).await {
            Response::Error(e) => {
                assert!(matches!(Error::from_rpc(0, e), Error::InvalidArgument(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            daemon.dispatch(Request::GetSize { path: "/f".into() }).await,
            Response::Size(0)
        );
    }

    #[tokio::test]
    async fn test_garbage_request() {
        let dir = tempdir().unwrap();
        let daemon = single_host(dir.path());
        let reply = daemon.handle(&[0xde, 0xad, 0xbe, 0xef, 0xff]).await;
        assert!(matches!(
            Response::decode(&reply).unwrap(),
            Response::Error(_)
        ));
    }

    #[tokio::test]
    async fn test_loopback_cluster() {
        let dir = tempdir().unwrap();
        let config = FsConfig {
            chunk_size: 4096,
            host_count: 3,
            io_workers: 2,
            distributor: DistributorConfig::Hash,
            ..FsConfig::default()
        };
        let transport = LoopbackTransport::local_cluster(&config, dir.path()).unwrap();
        assert_eq!(transport.host_count(), 3);

        for host in 0..3 {
            let resp = call(&transport, host, &Request::ChunkStat).await.unwrap();
            assert!(matches!(resp, Response::ChunkStat(s) if s.chunk_size == 4096));
        }

        transport.set_unreachable(1);
        let err = call(&transport, 1, &Request::ChunkStat).await.unwrap_err();
        assert!(err.is_retryable());
        transport.set_reachable(1);
        assert!(call(&transport, 1, &Request::ChunkStat).await.is_ok());

        assert!(call(&transport, 7, &Request::ChunkStat).await.is_err());
    }
}
