use base64::{engine::general_purpose::STANDARD, Engine as _};
use bgremove_api::{
    payload::{decode_base64_payload, png_data_url},
    BackendType, DefaultImageCodec, HandlerResponse, MockBackend, ModelRemover, RemovalConfig,
    RemoveBackgroundRequest, RequestHandler,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use axum::http::HeaderValue;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::Arc;

fn test_image(size: u32) -> DynamicImage {
    let mut image = RgbImage::from_pixel(size, size, Rgb([240, 240, 240]));
    for y in size / 4..size * 3 / 4 {
        for x in size / 4..size * 3 / 4 {
            image.put_pixel(x, y, Rgb([30, 60, 90]));
        }
    }
    DynamicImage::ImageRgb8(image)
}

fn request_body(image: &DynamicImage) -> Vec<u8> {
    let mut png = Cursor::new(Vec::new());
    image
        .write_to(&mut png, ImageFormat::Png)
        .expect("Failed to encode benchmark image");
    let url = format!("data:image/png;base64,{}", STANDARD.encode(png.get_ref()));
    let request = RemoveBackgroundRequest { image: Some(url) };
    serde_json::to_vec(&request).expect("Failed to build body")
}

fn mock_handler(target_size: usize) -> RequestHandler {
    let config = RemovalConfig::builder()
        .backend_type(BackendType::Mock)
        .build()
        .expect("Mock config is valid");
    let remover = ModelRemover::new(Box::new(MockBackend::with_target_size(target_size)), config);
    remover.initialize().expect("Mock backend initializes");
    RequestHandler::new(Arc::new(remover), Arc::new(DefaultImageCodec))
}

fn bench_handle_post(c: &mut Criterion) {
    let handler = mock_handler(320);
    let mut group = c.benchmark_group("handle_post");
    group.sample_size(20);

    for size in [64_u32, 256, 512] {
        let body = request_body(&test_image(size));
        let length = HeaderValue::from(body.len());

        group.bench_with_input(BenchmarkId::from_parameter(size), &body, |b, body| {
            b.iter(|| {
                let response: HandlerResponse = handler.handle_post(Some(&length), black_box(body));
                assert!(response.status.is_success());
                response
            });
        });
    }

    group.finish();
}

fn bench_payload_codec(c: &mut Criterion) {
    let mut png = Cursor::new(Vec::new());
    test_image(512)
        .write_to(&mut png, ImageFormat::Png)
        .expect("Failed to encode benchmark image");
    let png = png.into_inner();
    let url = png_data_url(&png);
    let payload = bgremove_api::payload::strip_data_url_prefix(&url).to_string();

    c.bench_function("png_data_url", |b| b.iter(|| png_data_url(black_box(&png))));
    c.bench_function("decode_base64_payload", |b| {
        b.iter(|| decode_base64_payload(black_box(&payload)))
    });
}

criterion_group!(benches, bench_handle_post, bench_payload_codec);
criterion_main!(benches);
