//! actix-web adapter for the lookup endpoint.

use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};

use crate::geodb::GeoDb;
use crate::request::{resolve_ip, FORWARDED_FOR_HEADER, REFLECTED_IP_HEADER};
use crate::server::GeoServer;

/// Per-route settings for the lookup handler.
#[derive(Debug, Clone)]
pub struct HandlerOptions {
    /// Path the handler is mounted at; the rest of the path is the address.
    pub base_path: String,
    /// `Access-Control-Allow-Origin` value, if any.
    pub allow_origin: Option<String>,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            base_path: "/".to_string(),
            allow_origin: None,
        }
    }
}

/// Mount the lookup handler for `GET {base_path}{ip}`.
///
/// The server and options are attached to this route only, so the handler
/// can be mounted more than once with different settings.
///
/// ```ignore
/// let server = web::Data::new(GeoServer::new(config).await?);
/// HttpServer::new(move || {
///     App::new().configure(|cfg| geoserve::http::configure(cfg, server.clone(), options.clone()))
/// })
/// ```
pub fn configure<D: GeoDb>(
    cfg: &mut web::ServiceConfig,
    server: web::Data<GeoServer<D>>,
    options: HandlerOptions,
) {
    let pattern = format!("{}{{ip:.*}}", options.base_path);
    // Scoped to the resource so several mounts can coexist on one app
    cfg.service(
        web::resource(&pattern)
            .app_data(server)
            .app_data(web::Data::new(options))
            .route(web::get().to(handle_lookup::<D>)),
    );
}

async fn handle_lookup<D: GeoDb>(
    req: HttpRequest,
    server: web::Data<GeoServer<D>>,
    options: web::Data<HandlerOptions>,
) -> HttpResponse {
    let forwarded_for = req
        .headers()
        .get(FORWARDED_FOR_HEADER)
        .and_then(|v| v.to_str().ok());
    let remote_addr = req.peer_addr().map(|addr| addr.to_string());

    let ip = resolve_ip(
        req.path(),
        &options.base_path,
        forwarded_for,
        remote_addr.as_deref(),
    );

    let response = server.handle(&ip, options.allow_origin.as_deref()).await;

    let mut builder = HttpResponse::build(
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    );
    if let Some(origin) = response.allow_origin {
        builder.insert_header(("Access-Control-Allow-Origin", origin));
    }
    if let Some(reflected) = response.reflected_ip {
        builder.insert_header((REFLECTED_IP_HEADER, reflected));
    }
    if response.body.is_empty() {
        builder.finish()
    } else {
        builder.content_type("application/json").body(response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::testing::TableDb;
    use actix_web::{test, App};

    async fn table_server(dir: &tempfile::TempDir) -> web::Data<GeoServer<TableDb>> {
        let path = dir.path().join("db.json");
        std::fs::write(
            &path,
            br#"{"83.25.1.1": {"country": "PL"}, "1.2.3.4": {"country": "AU"}, "10.0.0.9": {"country": "ZZ"}}"#,
        )
        .unwrap();
        web::Data::new(
            GeoServer::new(ServerConfig::from_file(path))
                .await
                .unwrap(),
        )
    }

    #[actix_web::test]
    async fn test_lookup_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let server = table_server(&dir).await;
        let app = test::init_service(App::new().configure(|cfg| {
            configure(cfg, server.clone(), HandlerOptions::default())
        }))
        .await;

        let req = test::TestRequest::get().uri("/83.25.1.1").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(REFLECTED_IP_HEADER).unwrap(), "83.25.1.1");
        assert!(resp.headers().get("Access-Control-Allow-Origin").is_none());
        let body = test::read_body(resp).await;
        assert_eq!(&body[..], br#"{"country":"PL"}"#);
    }

    #[actix_web::test]
    async fn test_lookup_own_address_under_base_path() {
        let dir = tempfile::tempdir().unwrap();
        let server = table_server(&dir).await;
        let options = HandlerOptions {
            base_path: "/lookup/".to_string(),
            allow_origin: Some("*".to_string()),
        };
        let app = test::init_service(
            App::new().configure(|cfg| configure(cfg, server.clone(), options.clone())),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/lookup/")
            .insert_header((FORWARDED_FOR_HEADER, "1.2.3.4, 5.6.7.8"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(REFLECTED_IP_HEADER).unwrap(), "1.2.3.4");
        assert_eq!(resp.headers().get("Access-Control-Allow-Origin").unwrap(), "*");

        let req = test::TestRequest::get()
            .uri("/lookup/")
            .peer_addr("10.0.0.9:51000".parse().unwrap())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(REFLECTED_IP_HEADER).unwrap(), "10.0.0.9");
    }

    #[actix_web::test]
    async fn test_unknown_address_is_500() {
        let dir = tempfile::tempdir().unwrap();
        let server = table_server(&dir).await;
        let options = HandlerOptions {
            allow_origin: Some("*".to_string()),
            ..HandlerOptions::default()
        };
        let app = test::init_service(
            App::new().configure(|cfg| configure(cfg, server.clone(), options.clone())),
        )
        .await;

        let req = test::TestRequest::get().uri("/192.0.2.1").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(resp.headers().get(REFLECTED_IP_HEADER).is_none());
        assert_eq!(resp.headers().get("Access-Control-Allow-Origin").unwrap(), "*");
        assert!(test::read_body(resp).await.is_empty());
    }

    #[actix_web::test]
    async fn test_mounts_keep_their_own_options() {
        let dir = tempfile::tempdir().unwrap();
        let server = table_server(&dir).await;
        let first = HandlerOptions {
            base_path: "/a/".to_string(),
            allow_origin: Some("https://a.example".to_string()),
        };
        let second = HandlerOptions {
            base_path: "/b/".to_string(),
            allow_origin: Some("https://b.example".to_string()),
        };
        let app = test::init_service(
            App::new()
                .configure(|cfg| configure(cfg, server.clone(), first.clone()))
                .configure(|cfg| configure(cfg, server.clone(), second.clone())),
        )
        .await;

        for (uri, origin) in [
            ("/a/83.25.1.1", "https://a.example"),
            ("/b/83.25.1.1", "https://b.example"),
        ] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK, "{}", uri);
            assert_eq!(resp.headers().get(REFLECTED_IP_HEADER).unwrap(), "83.25.1.1");
            assert_eq!(resp.headers().get("Access-Control-Allow-Origin").unwrap(), origin);
        }
    }

    #[actix_web::test]
    async fn test_maxmind_lookup_end_to_end() {
        use crate::maxmind::MaxMindDb;
        use crate::testing::country_mmdb;
        use std::net::Ipv4Addr;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("GeoLite2-Country.mmdb");
        std::fs::write(&path, country_mmdb(Ipv4Addr::new(83, 25, 0, 0), 16, "PL")).unwrap();

        let server = web::Data::new(
            GeoServer::<MaxMindDb>::new(ServerConfig::from_file(&path))
                .await
                .unwrap(),
        );
        let app = test::init_service(App::new().configure(|cfg| {
            configure(cfg, server.clone(), HandlerOptions::default())
        }))
        .await;

        let mut bodies = Vec::new();
        for _ in 0..2 {
            let req = test::TestRequest::get().uri("/83.25.1.1").to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(resp.headers().get(REFLECTED_IP_HEADER).unwrap(), "83.25.1.1");
            assert_eq!(
                resp.headers().get("Content-Type").unwrap(),
                "application/json"
            );
            bodies.push(test::read_body(resp).await);
        }
        assert_eq!(bodies[0], bodies[1]);

        let record: serde_json::Value = serde_json::from_slice(&bodies[0]).unwrap();
        assert_eq!(record["country"]["iso_code"], "PL");

        let stats = server.stats().await.unwrap();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);

        let req = test::TestRequest::get().uri("/8.8.8.8").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
