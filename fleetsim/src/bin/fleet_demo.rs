//! End-to-end demo: a directory, one simulated vehicle node and a monitor
//! node, all in one process.
//!
//! The vehicle node steps an Ackermann vehicle at 100 Hz, publishes
//! telemetry and offers a `set_twist` service; the monitor subscribes to the
//! telemetry and steers the vehicle through the service.
//!
//! Run with `RUST_LOG=debug` to watch the fabric traffic.

use std::time::Duration;

use fleetsim::library::messages::geometry::Twist2D;
use fleetsim::library::messages::telemetry::VehicleTelemetry;
use fleetsim::prelude::*;

fn main() -> FleetResult<()> {
    env_logger::init();

    let mut directory = DirectoryServer::spawn("127.0.0.1:0")?;

    // Vehicle node: telemetry publisher + twist command service.
    let mut vehicle_node = Client::with_directory("vehicle_1", &directory.endpoint())?;
    vehicle_node.connect()?;
    vehicle_node.advertise_topic::<VehicleTelemetry>("vehicle_1/telemetry")?;

    let cfg = AckermannConfig {
        controller: ControllerConfig::TwistFrontSteerPid {
            kp: 8.0,
            ki: 0.4,
            kd: 0.0,
            max_torque: 15.0,
        },
        ..AckermannConfig::default()
    };
    let mut vehicle = AckermannDynamics::from_config(&cfg)?;

    let twist_handle = vehicle
        .controller()
        .and_then(|c| c.twist_command_handle())
        .expect("twist controller installed above");
    vehicle_node.advertise_service("vehicle_1/set_twist", move |cmd: Twist2D| {
        twist_handle.set(cmd.vx, cmd.omega);
        Ok(cmd)
    })?;

    // Monitor node: telemetry consumer + remote driver.
    let mut monitor_node = Client::with_directory("monitor", &directory.endpoint())?;
    monitor_node.connect()?;
    let telemetry = monitor_node.subscribe_topic::<VehicleTelemetry>("vehicle_1/telemetry")?;

    let command = Twist2D {
        vx: 1.5,
        omega: 0.2,
    };
    let _echo: Twist2D = monitor_node.call_service("vehicle_1/set_twist", &command)?;

    // Stand-in for the external rigid-body integrator: dead-reckon the pose
    // from the vehicle's own odometry estimate.
    let dt = 0.01;
    let mut pose = Pose2D::default();
    for step in 0..300 {
        let ctx = SimContext {
            t: step as f64 * dt,
            dt,
        };
        let torques = vehicle.tick(&ctx)?;

        let odo = vehicle.velocity_local_odo_estimate();
        pose.theta += odo.omega * dt;
        pose.x += odo.vx * pose.theta.cos() * dt;
        pose.y += odo.vx * pose.theta.sin() * dt;

        let wheels = vehicle.wheels();
        let sample = VehicleTelemetry {
            sim_time: ctx.t,
            pose,
            wheel_yaws: [wheels[0].yaw, wheels[1].yaw, wheels[2].yaw, wheels[3].yaw],
            wheel_torques: torques,
        };
        vehicle_node.publish("vehicle_1/telemetry", &sample)?;
        std::thread::sleep(Duration::from_millis(2));
    }

    let mut last = None;
    while let Some(sample) = telemetry.try_recv() {
        last = Some(sample);
    }
    if let Some(sample) = last {
        let fl = &vehicle.wheels()[WHEEL_FL];
        println!(
            "t={:.2}s  pose=({:.2}, {:.2}, {:.2} rad)  fl_yaw={:.3} rad  fl drive force={:.1} N",
            sample.sim_time,
            sample.pose.x,
            sample.pose.y,
            sample.pose.theta,
            sample.wheel_yaws[WHEEL_FL],
            fl.contact_force(sample.wheel_torques[WHEEL_FL]),
        );
    }

    for node in monitor_node.request_list_of_nodes()? {
        println!("registered node: {node}");
    }

    monitor_node.shutdown();
    vehicle_node.shutdown();
    directory.stop();
    Ok(())
}
