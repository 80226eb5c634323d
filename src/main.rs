use keel::{
    app_info::AppInfo,
    boot::{boot, BootConfig},
    example,
};

#[tokio::main]
async fn main() {
    boot(BootConfig::new(AppInfo::keel_core(), vec![example::module()])).await;
}
