use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use flate2::{write::GzEncoder, Compression};

use image::{ImageFormat, Rgb, RgbImage};
use instafly::{
    dump::{self, tnetstring, CollectorConfig, Value},
    model::ImageSize,
    train::{train, TrainConfig},
};

fn dict(pairs: Vec<(&str, Value)>) -> Value {
    Value::Dict(
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<BTreeMap<_, _>>(),
    )
}

fn http_flow(host: &str, path: &str, body: Vec<u8>) -> Value {
    http_flow_with_headers(host, path, body, &[])
}

fn http_flow_with_headers(host: &str, path: &str, body: Vec<u8>, headers: &[(&str, &str)]) -> Value {
    let headers = headers
        .iter()
        .map(|(k, v)| Value::List(vec![Value::Bytes(k.as_bytes().to_vec()), Value::Bytes(v.as_bytes().to_vec())]))
        .collect();
    dict(vec![
        ("type", Value::String("http".into())),
        (
            "request",
            dict(vec![
                ("host", Value::Bytes(host.as_bytes().to_vec())),
                ("path", Value::Bytes(path.as_bytes().to_vec())),
            ]),
        ),
        (
            "response",
            dict(vec![("headers", Value::List(headers)), ("content", Value::Bytes(body))]),
        ),
    ])
}

fn jpeg(shade: u8) -> Vec<u8> {
    let img = RgbImage::from_fn(12, 10, |x, y| Rgb([shade, (x * 20) as u8, (y * 20) as u8]));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .unwrap();
    buf
}

fn profile(user: &str, followers: u64, posts: &[(&str, u64)]) -> Vec<u8> {
    let nodes: Vec<serde_json::Value> = posts
        .iter()
        .map(|(id, likes)| {
            serde_json::json!({
                "id": id,
                "owner": {"id": user},
                "likes": {"count": likes},
                "thumbnail_resources": [
                    {"src": format!("https://scontent-nrt1-1.cdninstagram.com/t51/{id}_s150.jpg")}
                ]
            })
        })
        .collect();
    serde_json::to_vec(&serde_json::json!({
        "user": {
            "id": user,
            "full_name": format!("user {user}"),
            "followed_by": {"count": followers},
            "media": {"nodes": nodes}
        }
    }))
    .unwrap()
}

fn write_dump(path: &std::path::Path) {
    let mut data = Vec::new();
    let flows = [
        http_flow(
            "www.instagram.com",
            "/first.user/?__a=1",
            profile("1", 100, &[("11", 30), ("12", 10)]),
        ),
        http_flow(
            "www.instagram.com",
            "/second_user/?__a=1",
            profile("2", 50, &[("21", 40), ("22", 5)]),
        ),
        http_flow("www.instagram.com", "/explore/", b"<html/>".to_vec()),
        http_flow("scontent-nrt1-1.cdninstagram.com", "/t51/11_s150.jpg", jpeg(10)),
        http_flow("scontent-nrt1-1.cdninstagram.com", "/t51/12_s150.jpg", jpeg(80)),
        http_flow("scontent-nrt1-1.cdninstagram.com", "/t51/21_s150.jpg", jpeg(160)),
        http_flow("scontent-nrt1-1.cdninstagram.com", "/t51/22_s150.jpg", jpeg(240)),
        http_flow("scontent-nrt1-1.cdninstagram.com", "/t51/99_s150.jpg", jpeg(0)),
    ];
    for flow in flows.iter() {
        tnetstring::encode_into(flow, &mut data);
        data.push(b'\n');
    }
    std::fs::write(path, data).unwrap();
}

#[test]
fn test_collect_from_dump() {
    let dir = tempfile::tempdir().unwrap();
    let dump_path = dir.path().join("flows.dump");
    write_dump(&dump_path);

    let users = dir.path().join("users.csv");
    let media = dir.path().join("media.csv");
    let images = dir.path().join("images");
    let summary = dump::collect(&dump_path, &users, &media, &images, CollectorConfig::default()).unwrap();
    assert_eq!(summary.users, 2);
    assert_eq!(summary.images, 4);

    assert_eq!(
        std::fs::read_to_string(&users).unwrap(),
        "id,name,followed_by\n1,user 1,100\n2,user 2,50\n"
    );
    assert_eq!(
        std::fs::read_to_string(&media).unwrap(),
        "id,likes,owner,path,like_rate\n\
         11,30,1,11.jpg,0.3\n\
         12,10,1,12.jpg,0.1\n\
         21,40,2,21.jpg,0.8\n\
         22,5,2,22.jpg,0.1\n"
    );
    for id in ["11", "12", "21", "22"] {
        let img = image::open(images.join(format!("{id}.jpg"))).unwrap();
        assert_eq!((img.width(), img.height()), (12, 10));
    }
    assert!(!images.join("99.jpg").exists());
}

#[test]
fn test_collect_then_train() {
    let dir = tempfile::tempdir().unwrap();
    let dump_path = dir.path().join("flows.dump");
    write_dump(&dump_path);
    let media = dir.path().join("media.csv");
    let images = dir.path().join("images");
    dump::collect(
        &dump_path,
        dir.path().join("users.csv"),
        &media,
        &images,
        CollectorConfig::default(),
    )
    .unwrap();

    let weights = dir.path().join("model.safetensors");
    let mut cfg = TrainConfig::new(&media, &images, &weights);
    cfg.size = ImageSize {
        width: 8,
        height: 8,
    };
    cfg.epochs = 2;
    cfg.batch_size = 2;
    cfg.train_fraction = 0.75;
    cfg.seed = Some(3);

    let report = train(&cfg).unwrap();
    assert_eq!(report.epoch_losses.len(), 2);
    assert!(report.epoch_losses.iter().all(|l| l.is_finite()));
    assert_eq!((report.num_train, report.num_test), (3, 1));
    assert!(report.test_mse.is_some_and(f32::is_finite));
    assert!(weights.exists());
}

#[test]
fn test_collect_missing_dump() {
    let dir = tempfile::tempdir().unwrap();
    let res = dump::collect(
        dir.path().join("missing.dump"),
        dir.path().join("u.csv"),
        dir.path().join("m.csv"),
        dir.path().join("img"),
        CollectorConfig::default(),
    );
    assert!(matches!(res, Err(instafly::Error::Io(_))));
}

#[test]
fn test_collect_gzipped_profile() {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(&profile("7", 20, &[("71", 4)])).unwrap();
    let flows = [
        http_flow_with_headers(
            "www.instagram.com",
            "/zipped/?__a=1",
            enc.finish().unwrap(),
            &[("content-type", "application/json"), ("content-encoding", "gzip")],
        ),
        http_flow("scontent-nrt1-1.cdninstagram.com", "/t51/71_s150.jpg", jpeg(50)),
    ];
    let mut data = Vec::new();
    for flow in flows.iter() {
        tnetstring::encode_into(flow, &mut data);
    }
    let dir = tempfile::tempdir().unwrap();
    let dump_path = dir.path().join("flows.dump");
    std::fs::write(&dump_path, data).unwrap();

    let users = dir.path().join("users.csv");
    let summary = dump::collect(
        &dump_path,
        &users,
        dir.path().join("media.csv"),
        dir.path().join("images"),
        CollectorConfig::default(),
    )
    .unwrap();
    assert_eq!((summary.users, summary.images), (1, 1));
    assert_eq!(
        std::fs::read_to_string(&users).unwrap(),
        "id,name,followed_by\n7,user 7,20\n"
    );
}
