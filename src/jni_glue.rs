//! JNI exports for `com.google.cardboard.VrActivity`
//!
//! The activity keeps the boxed app as an opaque `long` and passes it back on
//! every call. All calls arrive on the GL thread except create/destroy and
//! pause/resume, which the activity serializes with the GL thread itself.

use std::rc::Rc;

use jni::objects::{JByteBuffer, JObject};
use jni::sys::{jint, jlong};
use jni::JNIEnv;
use log::{error, info};

use crate::app::CardboardApp;
use crate::config::AppConfig;
use crate::error::{Result, VrError};
use crate::gfx::gles::Gles;
use crate::gfx::GlApi;
use crate::sdk::cardboard::{self, CardboardSdk};

type App = CardboardApp<CardboardSdk>;

unsafe fn app_from_handle<'a>(handle: jlong) -> Option<&'a mut App> {
    (handle as *mut App).as_mut()
}

fn log_err<T>(what: &str, result: Result<T>) {
    if let Err(e) = result {
        error!("{} failed: {}", what, e);
    }
}

fn create_app(env: &mut JNIEnv, activity: &JObject) -> Result<App> {
    let vm = env
        .get_java_vm()
        .map_err(|e| VrError::Sdk(format!("no JavaVM: {}", e)))?;
    unsafe { cardboard::initialize_android(vm.get_java_vm_pointer(), activity.as_raw()) };

    let gl: Rc<dyn GlApi> = Rc::new(Gles::load()?);
    CardboardApp::new(CardboardSdk, gl, AppConfig::default())
}

#[no_mangle]
pub unsafe extern "C" fn Java_com_google_cardboard_VrActivity_nativeOnCreate(
    mut env: JNIEnv,
    activity: JObject,
    _asset_manager: JObject,
) -> jlong {
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(if cfg!(debug_assertions) {
                log::LevelFilter::Debug
            } else {
                log::LevelFilter::Info
            })
            .with_tag("CardboardApp"),
    );

    info!("Cardboard app starting...");
    match create_app(&mut env, &activity) {
        Ok(app) => Box::into_raw(Box::new(app)) as jlong,
        Err(e) => {
            error!("nativeOnCreate failed: {}", e);
            0
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn Java_com_google_cardboard_VrActivity_nativeOnDestroy(
    _env: JNIEnv,
    _activity: JObject,
    native_app: jlong,
) {
    if native_app != 0 {
        drop(Box::from_raw(native_app as *mut App));
    }
}

#[no_mangle]
pub unsafe extern "C" fn Java_com_google_cardboard_VrActivity_nativeOnSurfaceCreated(
    _env: JNIEnv,
    _activity: JObject,
    native_app: jlong,
) {
    if let Some(app) = app_from_handle(native_app) {
        log_err("nativeOnSurfaceCreated", app.on_surface_created());
    }
}

#[no_mangle]
pub unsafe extern "C" fn Java_com_google_cardboard_VrActivity_nativeOnDrawFrame(
    _env: JNIEnv,
    _activity: JObject,
    native_app: jlong,
) {
    if let Some(app) = app_from_handle(native_app) {
        log_err("nativeOnDrawFrame", app.on_draw_frame());
    }
}

#[no_mangle]
pub unsafe extern "C" fn Java_com_google_cardboard_VrActivity_nativeOnTriggerEvent(
    _env: JNIEnv,
    _activity: JObject,
    native_app: jlong,
) {
    if let Some(app) = app_from_handle(native_app) {
        app.on_trigger_event();
    }
}

#[no_mangle]
pub unsafe extern "C" fn Java_com_google_cardboard_VrActivity_nativeOnPause(
    _env: JNIEnv,
    _activity: JObject,
    native_app: jlong,
) {
    if let Some(app) = app_from_handle(native_app) {
        app.on_pause();
    }
}

#[no_mangle]
pub unsafe extern "C" fn Java_com_google_cardboard_VrActivity_nativeOnResume(
    _env: JNIEnv,
    _activity: JObject,
    native_app: jlong,
) {
    if let Some(app) = app_from_handle(native_app) {
        app.on_resume();
    }
}

#[no_mangle]
pub unsafe extern "C" fn Java_com_google_cardboard_VrActivity_nativeSetScreenParams(
    _env: JNIEnv,
    _activity: JObject,
    native_app: jlong,
    width: jint,
    height: jint,
) {
    if let Some(app) = app_from_handle(native_app) {
        app.set_screen_params(width, height);
    }
}

#[no_mangle]
pub unsafe extern "C" fn Java_com_google_cardboard_VrActivity_nativeSwitchViewer(
    _env: JNIEnv,
    _activity: JObject,
    native_app: jlong,
) {
    if let Some(app) = app_from_handle(native_app) {
        app.switch_viewer();
    }
}

// RGBA frame in a direct ByteBuffer
#[no_mangle]
pub unsafe extern "C" fn Java_com_google_cardboard_VrActivity_nativeProcessFrame(
    env: JNIEnv,
    _activity: JObject,
    native_app: jlong,
    frame: JByteBuffer,
    width: jint,
    height: jint,
) {
    let Some(app) = app_from_handle(native_app) else {
        return;
    };

    let address = match env.get_direct_buffer_address(&frame) {
        Ok(address) if !address.is_null() => address,
        _ => {
            error!("nativeProcessFrame: frame is not a direct buffer");
            return;
        }
    };
    let capacity = match env.get_direct_buffer_capacity(&frame) {
        Ok(capacity) => capacity,
        Err(e) => {
            error!("nativeProcessFrame: {}", e);
            return;
        }
    };

    let rgba = std::slice::from_raw_parts(address, capacity);
    log_err("nativeProcessFrame", app.on_video_frame(rgba, width, height));
}
