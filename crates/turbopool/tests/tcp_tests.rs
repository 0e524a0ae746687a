//! Pooling real TCP connections against a local echo listener

#[cfg(feature = "tcp")]
mod tcp_tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use turbopool::{
        Connection, Pool, PoolConfigBuilder, PoolError, SlotState, TcpConnector, TcpTemplate,
    };

    async fn echo_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    loop {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                if socket.write_all(&buf[..n]).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        });
        addr
    }

    fn pool(addr: SocketAddr, core: usize, max: usize) -> Pool<TcpConnector> {
        let config = PoolConfigBuilder::new()
            .core_size(core)
            .max_size(max)
            .keep_alive(Duration::ZERO)
            .build()
            .unwrap();
        Pool::new(config, TcpConnector::new(), TcpTemplate::new(addr.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_leased_stream_round_trips() {
        let addr = echo_server().await;
        let pool = pool(addr, 1, 2);

        let conn = pool.lease().unwrap().await.unwrap();
        assert_eq!(conn.peer_addr(), addr);
        {
            let mut guard = conn.lock().await;
            let stream = guard.as_mut().unwrap();
            stream.write_all(b"hello").await.unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"hello");
        }

        pool.revert(&conn.id()).unwrap();
        let again = pool.lease().unwrap().await.unwrap();
        assert_eq!(again.id(), conn.id());
        pool.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_connections_are_distinct() {
        let addr = echo_server().await;
        let pool = pool(addr, 0, 2);

        let a = pool.lease().unwrap().await.unwrap();
        let b = pool.lease().unwrap().await.unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(pool.stats().live, 2);
        assert_eq!(pool.lease().unwrap_err(), PoolError::CapacityExceeded);
        pool.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_streams() {
        let addr = echo_server().await;
        let pool = pool(addr, 0, 2);

        let conn = pool.lease().unwrap().await.unwrap();
        assert_eq!(pool.state_of(&conn.id()), Some(SlotState::Busy));
        pool.shutdown().unwrap();

        assert!(conn.is_closed());
        assert!(conn.lock().await.is_none());
        assert_eq!(pool.size(), 0);
    }

    #[tokio::test]
    async fn test_refused_connection_releases_capacity() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let pool = pool(addr, 0, 1);
        let err = pool.lease().unwrap().await.unwrap_err();
        assert!(matches!(err, PoolError::EstablishFailed(_)));
        assert_eq!(pool.size(), 0);
        assert_eq!(pool.stats().establish_failures, 1);
    }
}
