use std::net::TcpListener;
use std::thread;

use axum::Router;

/// Serves `app` on an ephemeral localhost port from a background thread and
/// returns its base URL. The listener is bound before returning, so callers
/// can connect right away.
pub fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
    listener
        .set_nonblocking(true)
        .expect("non-blocking listener");
    let addr = listener.local_addr().expect("mock server address");

    thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("mock server runtime");
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).expect("tokio listener");
            axum::serve(listener, app).await.expect("mock server");
        });
    });

    format!("http://{addr}")
}
